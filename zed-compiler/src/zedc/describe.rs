//! A summary of what a query reads and what it produces, for clients that
//! want to know a query's shape without running it.

use crate::zedc::{
    analyzer::{
        add_default_source, analyze,
        errors::{CompileError, ErrorList},
    },
    compiler::source::{Head, Source},
    dag::{Op, Order, Path, SortKey, has_source},
    optimizer::{Optimizer, sort::propagate},
    parser::ZedParser,
    zed::Context,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub sources: Vec<DataSource>,
    pub channels: Vec<Channel>,
}

/// Where records come from. `inferred` is set when the query named no
/// source and one was supplied for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DataSource {
    Pool {
        name: String,
        id: Uuid,
        inferred: bool,
    },
    Path {
        uri: String,
        inferred: bool,
    },
    LakeMeta {
        meta: String,
    },
}

/// One output of the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    /// The group-by keys of the summarize that feeds this output. Empty for
    /// a summarize without keys, absent when no summarize feeds it.
    pub aggregation_keys: Option<Vec<Path>>,
    pub sort: Option<SortKey>,
}

/// URI reported for the runtime-bound default input.
pub const STDIN_URI: &str = "stdio://stdin";

pub fn describe(
    zctx: &Context,
    query: &str,
    source: &dyn Source,
    head: Option<&Head>,
    cancel: &CancellationToken,
) -> Result<Info, ErrorList> {
    let seq = ZedParser::parse_query(query).map_err(CompileError::from)?;
    let entry = analyze(zctx, &seq, source, head, cancel)?;
    Ok(describe_dag(zctx, entry, source, head, cancel)?)
}

/// Describes an analyzed DAG, adding the default source first if it has none.
pub fn describe_dag(
    zctx: &Context,
    mut entry: Vec<Op>,
    source: &dyn Source,
    head: Option<&Head>,
    cancel: &CancellationToken,
) -> Result<Info, CompileError> {
    let inferred = !has_source(&entry);
    add_default_source(zctx, &mut entry, source, head, cancel)?;
    describe_entry(&entry, inferred, source, &Optimizer::new(source, cancel), cancel)
}

/// Describes an entry that already begins with its scans. `optimizer`
/// supplies the scan orders.
pub(crate) fn describe_entry(
    entry: &[Op],
    inferred: bool,
    source: &dyn Source,
    optimizer: &Optimizer<'_>,
    cancel: &CancellationToken,
) -> Result<Info, CompileError> {
    let first = entry
        .first()
        .ok_or_else(|| CompileError::internal("describe: empty query"))?;
    let sources = describe_sources(first, source, inferred, cancel)?;

    let outputs = Outputs { optimizer }.seq(entry, Output::default());
    let channels = match outputs.as_slice() {
        [only] => vec![only.channel("main".to_string())],
        many => many
            .iter()
            .enumerate()
            .map(|(i, o)| o.channel(format!("main.{i}")))
            .collect(),
    };
    tracing::debug!(
        sources = sources.len(),
        channels = channels.len(),
        "described query"
    );
    Ok(Info { sources, channels })
}

fn describe_sources(
    op: &Op,
    source: &dyn Source,
    inferred: bool,
    cancel: &CancellationToken,
) -> Result<Vec<DataSource>, CompileError> {
    let pool = |id: Uuid| -> Result<Vec<DataSource>, CompileError> {
        Ok(vec![DataSource::Pool {
            name: source.pool_name(cancel, id)?,
            id,
            inferred,
        }])
    };
    match op {
        Op::Scope { body, .. } => {
            let first = body
                .first()
                .ok_or_else(|| CompileError::internal("describe: empty scope"))?;
            describe_sources(first, source, inferred, cancel)
        }
        Op::Fork { paths, .. } => {
            let mut out = Vec::new();
            for path in paths {
                let first = path
                    .first()
                    .ok_or_else(|| CompileError::internal("describe: empty fork path"))?;
                out.extend(describe_sources(first, source, inferred, cancel)?);
            }
            Ok(out)
        }
        Op::DefaultScan { .. } => Ok(vec![DataSource::Path {
            uri: STDIN_URI.to_string(),
            inferred,
        }]),
        Op::FileScan { path, .. } => Ok(vec![DataSource::Path {
            uri: path.clone(),
            inferred,
        }]),
        Op::HttpScan { url, .. } => Ok(vec![DataSource::Path {
            uri: url.clone(),
            inferred,
        }]),
        Op::PoolScan { id, .. } | Op::PoolMetaScan { id, .. } | Op::DeleteScan { id, .. } => {
            pool(*id)
        }
        Op::CommitMetaScan { pool: id, .. } => pool(*id),
        Op::LakeMetaScan { meta } => Ok(vec![DataSource::LakeMeta { meta: meta.clone() }]),
        other => Err(CompileError::internal(format!(
            "unsupported source type {}",
            other.kind()
        ))),
    }
}

/// The order and grouping of records at some point of the DAG.
#[derive(Debug, Clone, Default)]
struct Output {
    sort: Option<SortKey>,
    aggs: Option<Vec<Path>>,
}

impl Output {
    fn channel(&self, name: String) -> Channel {
        Channel {
            name,
            aggregation_keys: self.aggs.clone(),
            sort: self.sort.clone(),
        }
    }
}

struct Outputs<'a, 'o> {
    optimizer: &'a Optimizer<'o>,
}

impl Outputs<'_, '_> {
    /// Follows `seq` from `input` and returns one output per terminal path.
    fn seq(&self, seq: &[Op], input: Output) -> Vec<Output> {
        let mut outs = vec![input];
        for op in seq {
            outs = self.op(op, join(outs));
        }
        outs
    }

    fn op(&self, op: &Op, input: Output) -> Vec<Output> {
        match op {
            Op::Scope { body, .. } => self.seq(body, input),
            Op::Fork {
                paths,
                merge_by,
                merge_reverse,
            } => {
                let outs: Vec<Output> = paths
                    .iter()
                    .flat_map(|p| self.seq(p, input.clone()))
                    .collect();
                match merge_by {
                    // A merge combines the paths into one ordered output.
                    Some(key) => vec![Output {
                        sort: Some(SortKey::new(
                            key.clone(),
                            if *merge_reverse { Order::Desc } else { Order::Asc },
                        )),
                        aggs: common_aggs(&outs),
                    }],
                    None => outs,
                }
            }
            Op::Switch { cases, .. } => cases
                .iter()
                .flat_map(|c| self.seq(&c.path, input.clone()))
                .collect(),
            Op::Summarize { keys, .. } => vec![Output {
                sort: propagate(op, input.sort.as_ref()),
                aggs: Some(
                    keys.iter()
                        .filter_map(|k| k.lhs.as_path().cloned())
                        .collect(),
                ),
            }],
            op if op.is_scan() => vec![Output {
                sort: self.optimizer.sort_key_of(op),
                aggs: None,
            }],
            op => vec![Output {
                sort: propagate(op, input.sort.as_ref()),
                aggs: input.aggs,
            }],
        }
    }
}

/// Several parents feeding one operator lose their order and grouping.
fn join(mut parents: Vec<Output>) -> Output {
    match parents.len() {
        1 => parents.remove(0),
        _ => Output::default(),
    }
}

/// Aggregation keys shared by every output, when they all agree.
fn common_aggs(outs: &[Output]) -> Option<Vec<Path>> {
    let first = outs.first()?.aggs.clone();
    outs.iter().all(|o| o.aggs == first).then_some(first).flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zedc::compiler::source::{MemoryLake, NoLake, PoolEntry};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn run(query: &str, source: &dyn Source, head: Option<&Head>) -> Info {
        describe(
            &Context::new(),
            query,
            source,
            head,
            &CancellationToken::new(),
        )
        .unwrap()
    }

    fn path(p: &str) -> Path {
        p.split('.').map(str::to_string).collect()
    }

    #[test]
    fn stdin_is_an_inferred_path() {
        let info = run("count() by x", &NoLake, None);
        assert_eq!(
            info.sources,
            vec![DataSource::Path {
                uri: STDIN_URI.into(),
                inferred: true
            }]
        );
        assert_eq!(
            info.channels,
            vec![Channel {
                name: "main".into(),
                aggregation_keys: Some(vec![path("x")]),
                sort: None,
            }]
        );
    }

    #[test]
    fn files_report_their_order() {
        let info = run("file a.json order ts:desc | sort x", &NoLake, None);
        assert_eq!(
            info.sources,
            vec![DataSource::Path {
                uri: "a.json".into(),
                inferred: false
            }]
        );
        assert_eq!(
            info.channels[0].sort,
            Some(SortKey::new(path("x"), Order::Asc))
        );
        let unsorted = run("file a.json order ts:desc | head", &NoLake, None);
        assert_eq!(
            unsorted.channels[0].sort,
            Some(SortKey::new(path("ts"), Order::Desc))
        );
    }

    #[test]
    fn pools_are_named_and_forks_make_channels() {
        let id = Uuid::new_v4();
        let mut lake = MemoryLake::new();
        lake.add_pool(PoolEntry {
            name: "logs".into(),
            id,
            sort_key: SortKey::new(path("ts"), Order::Asc),
            branches: BTreeMap::from([("main".to_string(), Uuid::new_v4())]),
        })
        .unwrap();
        let head = Head::new("logs", "main");
        let info = run(
            "fork (=> count() => sum(x) by y | sort y)",
            &lake,
            Some(&head),
        );
        assert_eq!(
            info.sources,
            vec![DataSource::Pool {
                name: "logs".into(),
                id,
                inferred: true
            }]
        );
        assert_eq!(
            info.channels,
            vec![
                Channel {
                    name: "main.0".into(),
                    aggregation_keys: Some(vec![]),
                    sort: None,
                },
                Channel {
                    name: "main.1".into(),
                    aggregation_keys: Some(vec![path("y")]),
                    sort: Some(SortKey::new(path("y"), Order::Asc)),
                },
            ]
        );
    }

    #[test]
    fn info_serializes_with_kinds() {
        let info = run("pass", &NoLake, None);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["sources"][0]["kind"], "Path");
        assert_eq!(json["sources"][0]["uri"], STDIN_URI);
        assert_eq!(json["channels"][0]["name"], "main");
    }
}
