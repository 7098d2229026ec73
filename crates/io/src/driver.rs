//! Record-set level impute runs.
//!
//! A run builds one template group map from the whole of both record sets,
//! then splits the records into loop-over partitions (one per distinct
//! combination of `loop_over` values) and imputes each partition on its own
//! copy of the template.

use std::cmp::Ordering;

use imputer_core::AgeParser;
use imputer_engine::{
    record_keys, AgeGroupMapper, Aggregator, CartesianPairing, CategoricalWeights, ContinuousWeights,
    Disaggregator, GroupMap, GroupMapper, GroupType, KeyRoles, ProportionCalculator, RaggedPairing, Record,
    Value,
};
use tracing::info;

use crate::config::{Direction, Grouping, RunConfig};
use crate::error::{IoError, Result};
use crate::records::read_records;

const SUPERGROUPS: &str = "supergroups";
const SUBGROUPS: &str = "subgroups";
const PAIRING: &str = "pairing";

/// The record sets a run reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunInputs {
    pub supergroups: Vec<Record>,
    pub subgroups: Vec<Record>,
    pub pairing: Option<Vec<Record>>,
}

impl RunInputs {
    pub fn load(config: &RunConfig) -> Result<Self> {
        let numeric = config.numeric_keys();
        let pairing = match &config.files.pairing {
            Some(path) => Some(read_records(path, &[])?),
            None => None,
        };
        Ok(Self {
            supergroups: read_records(&config.files.supergroups, &numeric)?,
            subgroups: read_records(&config.files.subgroups, &numeric)?,
            pairing,
        })
    }
}

/// Load the configured files and impute in the configured direction.
pub fn run(config: &RunConfig) -> Result<Vec<Record>> {
    let inputs = RunInputs::load(config)?;
    impute(config, &inputs)
}

pub fn impute(config: &RunConfig, inputs: &RunInputs) -> Result<Vec<Record>> {
    info!(
        direction = %config.direction,
        grouping = %config.grouping,
        supergroups = inputs.supergroups.len(),
        subgroups = inputs.subgroups.len(),
        "starting run"
    );
    let pairing = inputs.pairing.as_deref();
    let out = match config.direction {
        Direction::Disaggregate => disaggregate(config, &inputs.supergroups, &inputs.subgroups, pairing)?,
        Direction::Aggregate => aggregate(config, &inputs.supergroups, &inputs.subgroups, pairing)?,
    };
    info!(records = out.len(), "run complete");
    Ok(out)
}

// ---------------------------------------------------------------------------
// Group map construction
// ---------------------------------------------------------------------------

/// Template map for the run, covering every group named anywhere in the
/// record sets.
pub fn create_group_map(
    config: &RunConfig,
    supergroups: &[Record],
    subgroups: &[Record],
    pairing: Option<&[Record]>,
) -> Result<GroupMap> {
    let map = match config.grouping {
        Grouping::Pairing => {
            let pairing = pairing.ok_or_else(|| {
                IoError::ConfigValidation("pairing grouping requires pairing records".into())
            })?;
            let subs = column(pairing, &config.subgroups_from, PAIRING)?;
            let supers = column(pairing, &config.supergroups_from, PAIRING)?;
            let mut combinations: Vec<Vec<Value>> = Vec::with_capacity(pairing.len());
            for (sub, sup) in subs.into_iter().zip(supers) {
                let combination = vec![sub.clone(), sup.clone()];
                if !combinations.contains(&combination) {
                    combinations.push(combination);
                }
            }
            RaggedPairing::new(combinations)
                .with_variable_names([config.subgroups_from.as_str(), config.supergroups_from.as_str()])
                .construct_group_map()?
        }
        Grouping::Categorical => {
            let supers = unique_sorted(column(supergroups, &config.supergroups_from, SUPERGROUPS)?);
            let subs = unique_sorted(column(subgroups, &config.subgroups_from, SUBGROUPS)?);
            CartesianPairing::new(supers, vec![subs])
                .with_variables(config.supergroups_from.as_str(), [config.subgroups_from.as_str()])
                .construct_group_map()?
        }
        Grouping::Age => {
            let parser = AgeParser::new(config.age_max).map_err(imputer_engine::ImputeError::from)?;
            let supers = age_labels(&parser, supergroups, &config.supergroups_from, SUPERGROUPS)?;
            let subs = age_labels(&parser, subgroups, &config.subgroups_from, SUBGROUPS)?;
            AgeGroupMapper::new(parser, supers, subs)
                .with_variable_name(config.subgroups_from.as_str())
                .construct_group_map()?
        }
    };
    Ok(map)
}

fn column<'a>(records: &'a [Record], key: &str, dataset: &str) -> Result<Vec<&'a Value>> {
    records
        .iter()
        .map(|r| {
            r.get(key).ok_or_else(|| IoError::MissingKey {
                dataset: dataset.to_string(),
                key: key.to_string(),
            })
        })
        .collect()
}

fn unique_sorted(values: Vec<&Value>) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::new();
    for value in values {
        if !unique.contains(value) {
            unique.push(value.clone());
        }
    }
    unique.sort_by(compare_values);
    unique
}

/// Numbers before everything else, numerically; the rest by display text.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.to_string().cmp(&b.to_string()),
    }
}

/// Distinct age labels, youngest band first. Labels that fail to parse sort
/// last and are reported by the mapper.
fn age_labels(parser: &AgeParser, records: &[Record], key: &str, dataset: &str) -> Result<Vec<String>> {
    let mut labels: Vec<String> = Vec::new();
    for (row, value) in column(records, key, dataset)?.into_iter().enumerate() {
        let label = value.as_str().ok_or_else(|| IoError::BadValue {
            dataset: dataset.to_string(),
            row,
            key: key.to_string(),
            reason: format!("is not an age label: {value}"),
        })?;
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
    let lower = |label: &str| parser.parse(label).map(|r| r.lower()).unwrap_or(f64::INFINITY);
    labels.sort_by(|a, b| lower(a).total_cmp(&lower(b)).then_with(|| a.cmp(b)));
    Ok(labels)
}

// ---------------------------------------------------------------------------
// Directions
// ---------------------------------------------------------------------------

/// Subgroup records with every supergroup measurement spread over them.
pub fn disaggregate(
    config: &RunConfig,
    supergroups: &[Record],
    subgroups: &[Record],
    pairing: Option<&[Record]>,
) -> Result<Vec<Record>> {
    let template = create_group_map(config, supergroups, subgroups, pairing)?;
    let roles = key_roles(config, supergroups)?;
    let calculator: Box<dyn ProportionCalculator> = match config.grouping {
        Grouping::Age => Box::new(ContinuousWeights::new(config.subgroups_from.as_str())),
        Grouping::Categorical | Grouping::Pairing => Box::new(
            CategoricalWeights::new(config.size_from.as_str())
                .with_normalize(config.normalize)
                .with_rel_tol(config.rel_tol),
        ),
    };
    let disaggregator = Disaggregator::new(calculator).with_size_from(config.size_from.as_str());

    impute_partitions(config, &template, &roles, supergroups, subgroups, GroupType::Subgroup, |map| {
        disaggregator.apply(map)
    })
}

/// Supergroup records with their subgroups' measurements rolled up.
pub fn aggregate(
    config: &RunConfig,
    supergroups: &[Record],
    subgroups: &[Record],
    pairing: Option<&[Record]>,
) -> Result<Vec<Record>> {
    let template = create_group_map(config, supergroups, subgroups, pairing)?;
    let roles = key_roles(config, subgroups)?;
    let aggregator = Aggregator::new(config.size_from.as_str());

    impute_partitions(config, &template, &roles, supergroups, subgroups, GroupType::Supergroup, |map| {
        aggregator.apply(map)
    })
}

/// Count and rate keys as configured; every other key of the source tier
/// is copied unless it is excluded, a loop-over key, a grouping key, or
/// the weighting key.
fn key_roles(config: &RunConfig, source: &[Record]) -> Result<KeyRoles> {
    let weighting_key = match config.grouping {
        Grouping::Age => &config.subgroups_from,
        Grouping::Categorical | Grouping::Pairing => &config.size_from,
    };
    let copy: Vec<String> = record_keys(source)?
        .into_iter()
        .filter(|k| {
            !config.loop_over.contains(k)
                && !config.exclude.contains(k)
                && !config.rate.contains(k)
                && !config.count.contains(k)
                && k != weighting_key
                && *k != config.supergroups_from
                && *k != config.subgroups_from
        })
        .collect();

    Ok(KeyRoles::default()
        .with_exclude(config.exclude.iter().cloned())
        .with_count(config.count.iter().cloned())
        .with_rate(config.rate.iter().cloned())
        .with_copy(copy))
}

// ---------------------------------------------------------------------------
// Loop-over partitions
// ---------------------------------------------------------------------------

type Partition = (Vec<Value>, Vec<Record>);

fn impute_partitions<F>(
    config: &RunConfig,
    template: &GroupMap,
    roles: &KeyRoles,
    supergroups: &[Record],
    subgroups: &[Record],
    output: GroupType,
    impute: F,
) -> Result<Vec<Record>>
where
    F: Fn(&GroupMap) -> imputer_engine::Result<GroupMap>,
{
    let loop_over = &config.loop_over;
    let super_keys = [config.supergroups_from.clone()];
    let sub_keys = match config.grouping {
        Grouping::Age => vec![config.subgroups_from.clone()],
        Grouping::Categorical | Grouping::Pairing => {
            vec![config.subgroups_from.clone(), config.supergroups_from.clone()]
        }
    };

    check_keys(supergroups, loop_over.iter().chain(&super_keys), SUPERGROUPS)?;
    check_keys(subgroups, loop_over.iter().chain(&sub_keys), SUBGROUPS)?;
    check_unique(supergroups, loop_over, &super_keys, SUPERGROUPS)?;
    check_unique(subgroups, loop_over, &sub_keys, SUBGROUPS)?;

    let super_parts = partition(supergroups, loop_over);
    let sub_parts = partition(subgroups, loop_over);
    check_same_partitions(&super_parts, &sub_parts)?;

    let mut out = Vec::new();
    for (key, super_rows) in &super_parts {
        let sub_rows = sub_parts
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, rows)| rows.as_slice())
            .unwrap_or_default();
        info!(
            partition = %describe(key),
            supergroups = super_rows.len(),
            subgroups = sub_rows.len(),
            "imputing partition"
        );
        let map = template
            .clone()
            .populate_from_records(super_rows, GroupType::Supergroup, roles)?
            .populate_from_records(sub_rows, GroupType::Subgroup, roles)?;
        out.extend(impute(&map)?.to_records(output)?);
    }
    Ok(out)
}

fn check_keys<'k>(records: &[Record], keys: impl IntoIterator<Item = &'k String>, dataset: &str) -> Result<()> {
    let present = record_keys(records)?;
    for key in keys {
        if !present.contains(key) {
            return Err(IoError::MissingKey {
                dataset: dataset.to_string(),
                key: key.clone(),
            });
        }
    }
    Ok(())
}

fn check_unique(records: &[Record], loop_over: &[String], group_keys: &[String], dataset: &str) -> Result<()> {
    let keys: Vec<&String> = loop_over.iter().chain(group_keys).collect();
    let mut seen: Vec<Vec<&Value>> = Vec::with_capacity(records.len());
    for record in records {
        let tuple: Vec<&Value> = keys.iter().map(|k| &record[k.as_str()]).collect();
        if seen.contains(&tuple) {
            let shown: Vec<String> = tuple.iter().map(|v| v.to_string()).collect();
            return Err(IoError::LoopOver(format!(
                "{dataset} records are not unique over {keys:?}: ({}) appears more than once",
                shown.join(", ")
            )));
        }
        seen.push(tuple);
    }
    Ok(())
}

/// Records grouped by their loop-over values, partitions in sorted order,
/// records in input order.
fn partition(records: &[Record], loop_over: &[String]) -> Vec<Partition> {
    let mut parts: Vec<Partition> = Vec::new();
    for record in records {
        let key: Vec<Value> = loop_over.iter().map(|k| record[k.as_str()].clone()).collect();
        match parts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, rows)) => rows.push(record.clone()),
            None => parts.push((key, vec![record.clone()])),
        }
    }
    parts.sort_by(|(a, _), (b, _)| {
        a.iter()
            .zip(b)
            .map(|(x, y)| compare_values(x, y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    parts
}

fn check_same_partitions(supers: &[Partition], subs: &[Partition]) -> Result<()> {
    let only_in = |a: &[Partition], b: &[Partition]| -> Vec<String> {
        a.iter()
            .filter(|(k, _)| !b.iter().any(|(other, _)| other == k))
            .map(|(k, _)| describe(k))
            .collect()
    };
    let super_only = only_in(supers, subs);
    let sub_only = only_in(subs, supers);
    if super_only.is_empty() && sub_only.is_empty() {
        return Ok(());
    }
    Err(IoError::LoopOver(format!(
        "partitions differ between record sets: only in supergroups {super_only:?}, only in subgroups {sub_only:?}"
    )))
}

fn describe(key: &[Value]) -> String {
    if key.is_empty() {
        return "(all)".to_string();
    }
    key.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn config(toml: &str) -> RunConfig {
        RunConfig::from_toml(toml).unwrap()
    }

    const CATEGORICAL: &str = r#"
direction = "disaggregate"
grouping = "categorical"
supergroups_from = "state"
subgroups_from = "splitvar"
count = ["deaths"]
loop_over = ["year"]

[files]
supergroups = "s.json"
subgroups = "g.json"
"#;

    #[test]
    fn values_sort_numbers_first() {
        let mut values = vec![Value::from("b"), Value::from(2.0), Value::from("a"), Value::from(1.0)];
        values.sort_by(compare_values);
        assert_eq!(values, [Value::from(1.0), Value::from(2.0), Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn age_labels_sorted_by_lower_bound() {
        let records = vec![
            rec(&[("age", "18+ years".into())]),
            rec(&[("age", "5-17 years".into())]),
            rec(&[("age", "0-4 years".into())]),
            rec(&[("age", "5-17 years".into())]),
        ];
        let labels = age_labels(&AgeParser::default(), &records, "age", SUBGROUPS).unwrap();
        assert_eq!(labels, ["0-4 years", "5-17 years", "18+ years"]);
    }

    #[test]
    fn non_text_age_label_rejected() {
        let records = vec![rec(&[("age", 4.0.into())])];
        let err = age_labels(&AgeParser::default(), &records, "age", SUBGROUPS).unwrap_err();
        assert!(matches!(err, IoError::BadValue { .. }));
    }

    #[test]
    fn partitions_sorted_and_complete() {
        let records = vec![
            rec(&[("year", 2021.0.into()), ("state", "CA".into())]),
            rec(&[("year", 2020.0.into()), ("state", "CA".into())]),
            rec(&[("year", 2021.0.into()), ("state", "WA".into())]),
        ];
        let parts = partition(&records, &["year".to_string()]);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0, [Value::from(2020.0)]);
        assert_eq!(parts[1].1.len(), 2);

        let whole = partition(&records, &[]);
        assert_eq!(whole.len(), 1);
        assert_eq!(describe(&whole[0].0), "(all)");
    }

    #[test]
    fn duplicate_rows_in_a_partition_rejected() {
        let records = vec![
            rec(&[("year", 2020.0.into()), ("state", "CA".into())]),
            rec(&[("year", 2020.0.into()), ("state", "CA".into())]),
        ];
        let err = check_unique(&records, &["year".to_string()], &["state".to_string()], SUPERGROUPS).unwrap_err();
        assert!(matches!(err, IoError::LoopOver(ref m) if m.contains("2020, CA")), "{err}");
    }

    #[test]
    fn mismatched_partitions_rejected() {
        let config = config(CATEGORICAL);
        let supers = vec![
            rec(&[("year", 2020.0.into()), ("state", "CA".into()), ("size", 4.0.into()), ("deaths", 2.0.into())]),
            rec(&[("year", 2021.0.into()), ("state", "CA".into()), ("size", 4.0.into()), ("deaths", 2.0.into())]),
        ];
        let subs = vec![
            rec(&[("year", 2020.0.into()), ("splitvar", "a".into()), ("state", "CA".into()), ("size", 4.0.into())]),
        ];
        let err = disaggregate(&config, &supers, &subs, None).unwrap_err();
        assert!(matches!(err, IoError::LoopOver(ref m) if m.contains("only in supergroups [\"2021\"]")), "{err}");
    }

    #[test]
    fn missing_loop_over_key_rejected() {
        let config = config(CATEGORICAL);
        let supers = vec![rec(&[("state", "CA".into()), ("size", 4.0.into()), ("deaths", 2.0.into())])];
        let subs = vec![rec(&[("year", 2020.0.into()), ("splitvar", "a".into()), ("state", "CA".into()), ("size", 4.0.into())])];
        let err = disaggregate(&config, &supers, &subs, None).unwrap_err();
        assert!(matches!(err, IoError::MissingKey { ref key, .. } if key == "year"), "{err}");
    }

    #[test]
    fn copy_keys_leave_out_grouping_and_weighting() {
        let config = config(CATEGORICAL);
        let supers = vec![rec(&[
            ("year", 2020.0.into()),
            ("state", "CA".into()),
            ("size", 4.0.into()),
            ("deaths", 2.0.into()),
            ("flower", "poppy".into()),
        ])];
        let roles = key_roles(&config, &supers).unwrap();
        assert_eq!(roles.copy.iter().collect::<Vec<_>>(), ["flower"]);
        assert!(roles.count.contains("deaths"));
    }

    #[test]
    fn loop_over_partitions_impute_independently() {
        let config = config(CATEGORICAL);
        let supers = vec![
            rec(&[("year", 2020.0.into()), ("state", "CA".into()), ("size", 4.0.into()), ("deaths", 8.0.into())]),
            rec(&[("year", 2021.0.into()), ("state", "CA".into()), ("size", 4.0.into()), ("deaths", 4.0.into())]),
        ];
        let subs = vec![
            rec(&[("year", 2021.0.into()), ("splitvar", "a".into()), ("state", "CA".into()), ("size", 1.0.into())]),
            rec(&[("year", 2021.0.into()), ("splitvar", "b".into()), ("state", "CA".into()), ("size", 3.0.into())]),
            rec(&[("year", 2020.0.into()), ("splitvar", "a".into()), ("state", "CA".into()), ("size", 2.0.into())]),
            rec(&[("year", 2020.0.into()), ("splitvar", "b".into()), ("state", "CA".into()), ("size", 2.0.into())]),
        ];
        let out = disaggregate(&config, &supers, &subs, None).unwrap();
        let rows: Vec<(f64, &str, f64)> = out
            .iter()
            .map(|r| {
                (
                    r["year"].as_f64().unwrap(),
                    r["splitvar"].as_str().unwrap(),
                    r["deaths"].as_f64().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            rows,
            [(2020.0, "a", 4.0), (2020.0, "b", 4.0), (2021.0, "a", 1.0), (2021.0, "b", 3.0)]
        );
    }
}
