use crate::commands::zson::inspect;

fn run(input: &str) -> eyre::Result<String> {
    let mut out = Vec::new();
    inspect(input.as_bytes(), &mut out)?;
    Ok(String::from_utf8(out).expect("utf-8 output"))
}

#[test]
fn test_values_print_with_types() {
    let out = run("{a:1} 80 (port=uint16)").unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["{a:1} : {a:int64}", "80 (port=uint16) : port=uint16"]);
}

#[test]
fn test_empty_input_prints_nothing() {
    assert_eq!(run("  \n").unwrap(), "");
}

#[test]
fn test_errors_name_the_value() {
    let err = run("1 \"unterminated").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("while reading value 2"), "{msg}");
}
