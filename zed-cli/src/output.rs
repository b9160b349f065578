use eyre::Result;
use serde::Serialize;
use std::io::Write;

/// Writes compiler stages to `out`, each under a boxed title when more than
/// one stage was asked for.
pub struct StageWriter<'a, W: Write> {
    out: &'a mut W,
    banners: bool,
}

impl<'a, W: Write> StageWriter<'a, W> {
    pub fn new(out: &'a mut W, stages: usize) -> Self {
        Self {
            out,
            banners: stages > 1,
        }
    }

    pub fn text(&mut self, title: &str, body: &str) -> Result<()> {
        self.banner(title)?;
        writeln!(self.out, "{body}")?;
        Ok(())
    }

    pub fn json<T: Serialize>(&mut self, title: &str, value: &T) -> Result<()> {
        let body = serde_json::to_string_pretty(value)?;
        self.text(title, &body)
    }

    fn banner(&mut self, title: &str) -> Result<()> {
        if self.banners {
            write!(self.out, "{}", banner(title))?;
        }
        Ok(())
    }
}

pub fn banner(title: &str) -> String {
    let bars = "=".repeat(title.len());
    format!("/{bars}\\\n|{title}|\n\\{bars}/\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banners_box_the_title() {
        assert_eq!(banner("proc"), "/====\\\n|proc|\n\\====/\n");
    }

    #[test]
    fn single_stage_has_no_banner() {
        let mut buf = Vec::new();
        StageWriter::new(&mut buf, 1).text("proc", "pass").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "pass\n");
    }

    #[test]
    fn json_is_pretty() {
        let mut buf = Vec::new();
        StageWriter::new(&mut buf, 2)
            .json("describe", &serde_json::json!({"a": 1}))
            .unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("/========\\\n|describe|"));
        assert!(out.ends_with("{\n  \"a\": 1\n}\n"));
    }
}
