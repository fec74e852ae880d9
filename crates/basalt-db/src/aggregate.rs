use std::collections::BTreeMap;

use basalt_core::{Document, Value};
use basalt_query::{
    AccInput, Accumulator, GroupSpec, Stage, matches, sort_documents,
};

use crate::error::DbError;

/// Run a parsed pipeline left to right. Every stage is a total function
/// on its input; stage parsing has already rejected anything malformed.
pub(crate) fn run_pipeline(input: Vec<Document>, stages: &[Stage]) -> Result<Vec<Document>, DbError> {
    let mut docs = input;
    for stage in stages {
        docs = match stage {
            Stage::Match(filter) => {
                docs.retain(|d| matches(d, filter));
                docs
            }
            Stage::Project(projection) => docs.iter().map(|d| projection.apply(d)).collect(),
            Stage::Sort(sorts) => {
                sort_documents(&mut docs, sorts);
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Group(spec) => run_group(&docs, spec),
        };
    }
    Ok(docs)
}

/// Numeric accumulation that stays in the integer domain until a float
/// shows up.
#[derive(Default)]
struct NumAcc {
    int_sum: i64,
    float_sum: f64,
    saw_float: bool,
    count: u64,
}

impl NumAcc {
    fn add(&mut self, value: &Value) {
        match value {
            Value::Int(i) => {
                self.int_sum = self.int_sum.wrapping_add(*i);
                self.float_sum += *i as f64;
                self.count += 1;
            }
            Value::Double(d) => {
                self.saw_float = true;
                self.float_sum += d;
                self.count += 1;
            }
            _ => {}
        }
    }

    fn sum(&self) -> Value {
        if self.saw_float {
            Value::Double(self.float_sum)
        } else {
            Value::Int(self.int_sum)
        }
    }

    fn avg(&self) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Double(self.float_sum / self.count as f64)
        }
    }
}

enum AccState {
    Sum(NumAcc),
    Avg(NumAcc),
    Min(Option<Value>),
    Max(Option<Value>),
    Count(u64),
}

impl AccState {
    fn new(acc: &Accumulator) -> AccState {
        match acc {
            Accumulator::Sum(_) => AccState::Sum(NumAcc::default()),
            Accumulator::Avg(_) => AccState::Avg(NumAcc::default()),
            Accumulator::Min(_) => AccState::Min(None),
            Accumulator::Max(_) => AccState::Max(None),
            Accumulator::Count => AccState::Count(0),
        }
    }

    fn feed(&mut self, acc: &Accumulator, doc: &Document) {
        let input = match acc {
            Accumulator::Sum(input)
            | Accumulator::Avg(input)
            | Accumulator::Min(input)
            | Accumulator::Max(input) => Some(input),
            Accumulator::Count => None,
        };
        let value = input.and_then(|input| match input {
            AccInput::Field(f) => doc.get(f).cloned(),
            AccInput::Constant(v) => Some(v.clone()),
        });

        match (self, value) {
            (AccState::Count(n), _) => *n += 1,
            (AccState::Sum(num) | AccState::Avg(num), Some(v)) => num.add(&v),
            (AccState::Min(best), Some(v)) => {
                let take = match best {
                    None => true,
                    Some(current) => {
                        v.compare_typed(current) == Some(std::cmp::Ordering::Less)
                    }
                };
                if take {
                    *best = Some(v);
                }
            }
            (AccState::Max(best), Some(v)) => {
                let take = match best {
                    None => true,
                    Some(current) => {
                        v.compare_typed(current) == Some(std::cmp::Ordering::Greater)
                    }
                };
                if take {
                    *best = Some(v);
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum(num) => num.sum(),
            AccState::Avg(num) => num.avg(),
            AccState::Min(best) | AccState::Max(best) => best.unwrap_or(Value::Null),
            AccState::Count(n) => Value::Int(n as i64),
        }
    }
}

struct GroupEntry {
    key: Value,
    states: Vec<AccState>,
}

fn run_group(docs: &[Document], spec: &GroupSpec) -> Vec<Document> {
    // Keyed by canonical form so coercing-equal keys share a bucket.
    // Output order is unspecified by contract; a BTreeMap keeps it
    // deterministic within one build.
    let mut groups: BTreeMap<String, GroupEntry> = BTreeMap::new();

    for doc in docs {
        let key = match &spec.key {
            basalt_query::GroupKey::Field(f) => doc.get(f).cloned().unwrap_or(Value::Null),
            basalt_query::GroupKey::Constant(v) => v.clone(),
        };
        let entry = groups.entry(key.canonical()).or_insert_with(|| GroupEntry {
            key,
            states: spec.fields.iter().map(|(_, acc)| AccState::new(acc)).collect(),
        });
        for ((_, acc), state) in spec.fields.iter().zip(entry.states.iter_mut()) {
            state.feed(acc, doc);
        }
    }

    groups
        .into_values()
        .map(|entry| {
            let mut out = Document::new();
            out.set("_id", entry.key);
            for ((name, _), state) in spec.fields.iter().zip(entry.states) {
                out.set(name.clone(), state.finish());
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::doc;
    use basalt_query::parse_pipeline;

    fn input() -> Vec<Document> {
        vec![
            doc! { "cat": "A", "price": 10, "qty": 2 },
            doc! { "cat": "A", "price": 20, "qty": 1 },
            doc! { "cat": "B", "price": 30, "qty": 5 },
        ]
    }

    fn run(input: Vec<Document>, stages: &[Document]) -> Vec<Document> {
        run_pipeline(input, &parse_pipeline(stages).unwrap()).unwrap()
    }

    #[test]
    fn empty_pipeline_returns_input() {
        let out = run(input(), &[]);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn match_then_sort() {
        let out = run(
            input(),
            &[
                doc! { "$match": { "cat": "A" } },
                doc! { "$sort": { "price": -1 } },
            ],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get_i64("price"), Some(20));
    }

    #[test]
    fn group_sums_per_key() {
        let out = run(
            input(),
            &[
                doc! { "$group": { "_id": "$cat", "total": { "$sum": "$price" } } },
                doc! { "$sort": { "_id": 1 } },
            ],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], doc! { "_id": "A", "total": 30 });
        assert_eq!(out[1], doc! { "_id": "B", "total": 30 });
    }

    #[test]
    fn group_avg_min_max_count() {
        let out = run(
            input(),
            &[doc! { "$group": {
                "_id": null,
                "avg": { "$avg": "$price" },
                "lo": { "$min": "$price" },
                "hi": { "$max": "$price" },
                "n": { "$count": {} },
            } }],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_f64("avg"), Some(20.0));
        assert_eq!(out[0].get_i64("lo"), Some(10));
        assert_eq!(out[0].get_i64("hi"), Some(30));
        assert_eq!(out[0].get_i64("n"), Some(3));
    }

    #[test]
    fn group_constant_sum_counts_documents() {
        let out = run(
            input(),
            &[doc! { "$group": { "_id": null, "n": { "$sum": 1 } } }],
        );
        assert_eq!(out[0].get_i64("n"), Some(3));
    }

    #[test]
    fn skip_past_end_is_empty() {
        let out = run(input(), &[doc! { "$skip": 10 }]);
        assert!(out.is_empty());
    }

    #[test]
    fn missing_group_field_buckets_as_null() {
        let docs = vec![doc! { "x": 1 }, doc! { "cat": "A", "x": 2 }];
        let out = run(
            docs,
            &[doc! { "$group": { "_id": "$cat", "n": { "$sum": "$x" } } }],
        );
        assert_eq!(out.len(), 2);
        // Null bucket collects the document without the key.
        let null_group = out
            .iter()
            .find(|d| d.get("_id") == Some(&Value::Null))
            .unwrap();
        assert_eq!(null_group.get_i64("n"), Some(1));
    }

    #[test]
    fn project_inside_pipeline() {
        let out = run(
            input(),
            &[
                doc! { "$project": { "cat": 1, "_id": 0 } },
                doc! { "$limit": 1 },
            ],
        );
        assert_eq!(out[0], doc! { "cat": "A" });
    }
}
