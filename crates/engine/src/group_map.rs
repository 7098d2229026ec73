//! The subgroup/supergroup hierarchy over a set of groups.
//!
//! A `GroupMap` is built once from a name pairing, populated tier by tier
//! (from records or bulk values), then handed to an
//! [`Aggregator`](crate::imputer::Aggregator) or
//! [`Disaggregator`](crate::imputer::Disaggregator), which produce a new map.
//! Operations that change the map consume it and return the new state.

use indexmap::IndexMap;

use crate::attribute::{Attribute, ImputeAction, MeasurementType};
use crate::error::{ImputeError, Result};
use crate::group::{Group, GroupType};
use crate::records::{record_keys, KeyRoles, Record};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct GroupMap {
    sub_to_super: IndexMap<String, String>,
    super_to_sub: IndexMap<String, Vec<String>>,
    groups: IndexMap<String, Group>,
}

impl GroupMap {
    /// Build from a subgroup -> supergroup pairing. Without `groups`, an
    /// empty group is synthesized for every name in the pairing.
    pub fn new(sub_to_super: IndexMap<String, String>, groups: Option<Vec<Group>>) -> Result<Self> {
        let super_to_sub = invert(&sub_to_super);

        let groups = match groups {
            Some(list) => {
                let mut groups = IndexMap::with_capacity(list.len());
                let mut duplicated = Vec::new();
                for group in list {
                    let name = group.name().to_string();
                    if groups.insert(name.clone(), group).is_some() {
                        duplicated.push(name);
                    }
                }
                if !duplicated.is_empty() {
                    return Err(ImputeError::MalformedHierarchy {
                        reason: "duplicate group names".into(),
                        names: duplicated,
                    });
                }
                groups
            }
            None => {
                let mut groups = IndexMap::new();
                for (sub, sup) in &sub_to_super {
                    for name in [sup, sub] {
                        groups
                            .entry(name.clone())
                            .or_insert_with(|| Group::new(name.clone()));
                    }
                }
                groups
            }
        };

        let map = Self {
            sub_to_super,
            super_to_sub,
            groups,
        };
        map.validate()?;
        Ok(map)
    }

    /// Build from a supergroup -> subgroups listing.
    pub fn from_supergroups(
        super_to_sub: IndexMap<String, Vec<String>>,
        groups: Option<Vec<Group>>,
    ) -> Result<Self> {
        let mut sub_to_super = IndexMap::new();
        let mut repeated = Vec::new();
        for (sup, subs) in super_to_sub {
            for sub in subs {
                if sub_to_super.insert(sub.clone(), sup.clone()).is_some() {
                    repeated.push(sub);
                }
            }
        }
        if !repeated.is_empty() {
            return Err(ImputeError::MalformedHierarchy {
                reason: "subgroup listed under more than one supergroup".into(),
                names: repeated,
            });
        }
        Self::new(sub_to_super, groups)
    }

    fn validate(&self) -> Result<()> {
        let unknown: Vec<String> = self
            .sub_to_super
            .iter()
            .flat_map(|(sub, sup)| [sub, sup])
            .filter(|name| !self.groups.contains_key(name.as_str()))
            .cloned()
            .collect::<indexmap::IndexSet<_>>()
            .into_iter()
            .collect();
        if !unknown.is_empty() {
            return malformed("named in the pairing but missing from the groups", unknown);
        }

        let orphans: Vec<String> = self
            .groups
            .keys()
            .filter(|name| !self.sub_to_super.contains_key(*name) && !self.super_to_sub.contains_key(*name))
            .cloned()
            .collect();
        if !orphans.is_empty() {
            return malformed("not part of the pairing", orphans);
        }

        let self_loops: Vec<String> = self
            .sub_to_super
            .iter()
            .filter(|(sub, sup)| sub == sup)
            .map(|(sub, _)| sub.clone())
            .collect();
        if !self_loops.is_empty() {
            return malformed("group is its own supergroup", self_loops);
        }

        // A group on both sides must be the supergroup of exactly one subgroup.
        let fanned_out: Vec<String> = self
            .sub_to_super
            .keys()
            .filter(|name| self.super_to_sub.get(*name).is_some_and(|subs| subs.len() != 1))
            .cloned()
            .collect();
        if !fanned_out.is_empty() {
            return malformed(
                "group is both a subgroup and a supergroup but is not 1:1",
                fanned_out,
            );
        }

        let cyclic: Vec<String> = self
            .sub_to_super
            .keys()
            .filter(|name| self.ancestors(name).count() > self.sub_to_super.len())
            .cloned()
            .collect();
        if !cyclic.is_empty() {
            return malformed("cyclic hierarchy", cyclic);
        }

        Ok(())
    }

    /// Supergroup, supergroup's supergroup, and so on. An acyclic chain is
    /// no longer than the pairing, so one extra step marks a cycle.
    fn ancestors<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let mut current = name;
        std::iter::from_fn(move || {
            let parent = self.sub_to_super.get(current)?;
            current = parent.as_str();
            Some(current)
        })
        .take(self.sub_to_super.len() + 1)
    }

    pub fn sub_to_super(&self) -> &IndexMap<String, String> {
        &self.sub_to_super
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn group(&self, name: &str) -> Result<&Group> {
        self.groups
            .get(name)
            .ok_or_else(|| ImputeError::UnknownGroup(name.to_string()))
    }

    pub fn supergroup_of(&self, subgroup: &str) -> Option<&str> {
        self.sub_to_super.get(subgroup).map(String::as_str)
    }

    /// Supergroups in order of first appearance in the pairing.
    pub fn supergroup_names(&self) -> Vec<&str> {
        self.super_to_sub.keys().map(String::as_str).collect()
    }

    /// Supergroups ordered so that a supergroup comes after its own
    /// supergroup. Only differs from [`GroupMap::supergroup_names`] for
    /// chained hierarchies.
    pub fn supergroups_top_down(&self) -> Vec<&str> {
        let mut names = self.supergroup_names();
        names.sort_by_key(|name| self.ancestors(name).count());
        names
    }

    /// Every subgroup, supergroup by supergroup.
    pub fn subgroup_names(&self) -> Vec<&str> {
        self.super_to_sub
            .values()
            .flat_map(|subs| subs.iter().map(String::as_str))
            .collect()
    }

    /// Subgroups of one supergroup.
    pub fn subgroups_of(&self, supergroup: &str) -> Result<&[String]> {
        self.super_to_sub
            .get(supergroup)
            .map(Vec::as_slice)
            .ok_or_else(|| ImputeError::UnknownGroup(supergroup.to_string()))
    }

    pub fn tier_names(&self, tier: GroupType) -> Vec<&str> {
        match tier {
            GroupType::Supergroup => self.supergroup_names(),
            GroupType::Subgroup => self.subgroup_names(),
        }
    }

    fn owned_tier_names(&self, tier: GroupType) -> Vec<String> {
        self.tier_names(tier).into_iter().map(str::to_string).collect()
    }

    /// Set attribute `name` on every group of `tier`. `values` must hold a
    /// value for each of them.
    pub fn add_attribute(
        self,
        tier: GroupType,
        name: &str,
        values: &IndexMap<String, Value>,
        action: ImputeAction,
        measurement: Option<MeasurementType>,
    ) -> Result<Self> {
        self.add_attribute_with(tier, name, values, |value| {
            Attribute::from_parts(name, value.clone(), action, measurement)
        })
    }

    /// Like [`GroupMap::add_attribute`] for `ignore` attributes whose
    /// record value differs from the value, e.g. a parsed range and its
    /// label.
    pub fn add_labelled_attribute(
        self,
        tier: GroupType,
        name: &str,
        values: &IndexMap<String, (Value, Value)>,
    ) -> Result<Self> {
        self.add_attribute_with(tier, name, values, |(value, label)| {
            Ok(Attribute::new(name, value.clone(), ImputeAction::Ignore)?.with_record_value(label.clone()))
        })
    }

    fn add_attribute_with<T>(
        mut self,
        tier: GroupType,
        name: &str,
        values: &IndexMap<String, T>,
        build: impl Fn(&T) -> Result<Attribute>,
    ) -> Result<Self> {
        let targets = self.owned_tier_names(tier);
        let missing: Vec<String> = targets
            .iter()
            .filter(|g| !values.contains_key(g.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ImputeError::IncompleteData {
                attribute: name.to_string(),
                missing,
            });
        }

        for group_name in targets {
            let attr = build(&values[group_name.as_str()])?;
            let group = self.group(&group_name)?.add_attribute(attr)?;
            self.groups.insert(group_name, group);
        }
        Ok(self)
    }

    /// Declare the record keys identifying every group of `tier`.
    pub fn add_filters(mut self, tier: GroupType, filters: &[String]) -> Result<Self> {
        for group_name in self.owned_tier_names(tier) {
            let group = self.group(&group_name)?.with_filters(tier, filters, false)?;
            self.groups.insert(group_name, group);
        }
        Ok(self)
    }

    /// The filter keys of `tier`, which all its groups must share.
    pub fn filters(&self, tier: GroupType) -> Result<Vec<String>> {
        let mut shared: Option<&[String]> = None;
        for group_name in self.tier_names(tier) {
            let group = self.group(group_name)?;
            let filters = group.filters(tier).ok_or_else(|| ImputeError::MissingFilter {
                group: group_name.to_string(),
                tier,
            })?;
            match shared {
                None => shared = Some(filters),
                Some(prev) if prev != filters => return Err(ImputeError::InconsistentFilters { tier }),
                Some(_) => {}
            }
        }
        Ok(shared.map(<[String]>::to_vec).unwrap_or_default())
    }

    /// Populate every group of `tier` from the one record its filters
    /// select.
    ///
    /// Every record key that is neither excluded nor a filter key becomes
    /// an attribute, classified by `roles`.
    pub fn populate_from_records(self, records: &[Record], tier: GroupType, roles: &KeyRoles) -> Result<Self> {
        let filters = self.filters(tier)?;
        let keys: Vec<String> = record_keys(records)?
            .into_iter()
            .filter(|k| !roles.is_excluded(k) && !filters.contains(k))
            .collect();

        let mut rows: IndexMap<String, &Record> = IndexMap::new();
        for group_name in self.tier_names(tier) {
            let group = self.group(group_name)?;
            let mut matched = Vec::new();
            for record in records {
                if group.matches_record(record, tier)? {
                    matched.push(record);
                }
            }
            match matched.as_slice() {
                [row] => {
                    rows.insert(group_name.to_string(), *row);
                }
                _ => {
                    return Err(ImputeError::AmbiguousRow {
                        group: group_name.to_string(),
                        matches: matched.len(),
                    })
                }
            }
        }

        let mut map = self;
        for key in &keys {
            let values: IndexMap<String, Value> = rows
                .iter()
                .map(|(group_name, row)| (group_name.clone(), row[key.as_str()].clone()))
                .collect();
            let (action, measurement) = roles.classify(key);
            map = map.add_attribute(tier, key, &values, action, measurement)?;
        }
        Ok(map)
    }

    /// One record per group of `tier`, in tier order.
    pub fn to_records(&self, tier: GroupType) -> Result<Vec<Record>> {
        self.tier_names(tier)
            .into_iter()
            .map(|name| self.group(name).map(Group::to_record))
            .collect()
    }
}

fn invert(sub_to_super: &IndexMap<String, String>) -> IndexMap<String, Vec<String>> {
    let mut super_to_sub: IndexMap<String, Vec<String>> = IndexMap::new();
    for (sub, sup) in sub_to_super {
        super_to_sub.entry(sup.clone()).or_default().push(sub.clone());
    }
    super_to_sub
}

fn malformed(reason: &str, names: Vec<String>) -> Result<()> {
    Err(ImputeError::MalformedHierarchy {
        reason: reason.to_string(),
        names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairing(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    fn values(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn counties() -> GroupMap {
        GroupMap::new(
            pairing(&[
                ("Sutter", "California"),
                ("Skagit", "Washington"),
                ("San Juan", "Washington"),
            ]),
            None,
        )
        .unwrap()
    }

    #[test]
    fn navigation_follows_insertion_order() {
        let map = counties();
        assert_eq!(map.supergroup_names(), ["California", "Washington"]);
        assert_eq!(map.subgroup_names(), ["Sutter", "Skagit", "San Juan"]);
        assert_eq!(map.subgroups_of("Washington").unwrap(), ["Skagit", "San Juan"]);
        assert_eq!(map.supergroup_of("Skagit"), Some("Washington"));
        assert!(matches!(
            map.subgroups_of("Oregon"),
            Err(ImputeError::UnknownGroup(_))
        ));
    }

    #[test]
    fn from_supergroups_matches_pairing() {
        let mut listing = IndexMap::new();
        listing.insert("California".to_string(), vec!["Sutter".to_string()]);
        listing.insert(
            "Washington".to_string(),
            vec!["Skagit".to_string(), "San Juan".to_string()],
        );
        assert_eq!(GroupMap::from_supergroups(listing, None).unwrap(), counties());
    }

    #[test]
    fn missing_and_orphan_groups_rejected() {
        let err = GroupMap::new(pairing(&[("a", "A")]), Some(vec![Group::new("a")])).unwrap_err();
        assert!(matches!(err, ImputeError::MalformedHierarchy { ref names, .. } if names == &["A"]));

        let err = GroupMap::new(
            pairing(&[("a", "A")]),
            Some(vec![Group::new("a"), Group::new("A"), Group::new("stray")]),
        )
        .unwrap_err();
        assert!(matches!(err, ImputeError::MalformedHierarchy { ref names, .. } if names == &["stray"]));
    }

    #[test]
    fn chained_hierarchy_must_be_one_to_one() {
        // A -> B -> C is fine.
        assert!(GroupMap::new(pairing(&[("B", "A"), ("C", "B")]), None).is_ok());

        // B is a subgroup of A and the supergroup of two groups.
        let err = GroupMap::new(pairing(&[("B", "A"), ("C", "B"), ("D", "B")]), None).unwrap_err();
        assert!(matches!(err, ImputeError::MalformedHierarchy { ref names, .. } if names == &["B"]));

        let err = GroupMap::new(pairing(&[("A", "A")]), None).unwrap_err();
        assert!(matches!(err, ImputeError::MalformedHierarchy { .. }));

        let err = GroupMap::new(pairing(&[("A", "B"), ("B", "A")]), None).unwrap_err();
        assert!(matches!(err, ImputeError::MalformedHierarchy { ref reason, .. } if reason == "cyclic hierarchy"));
    }

    #[test]
    fn chained_supergroups_sorted_top_down() {
        let map = GroupMap::new(pairing(&[("D", "C"), ("C", "B"), ("B", "A")]), None).unwrap();
        assert_eq!(map.supergroup_names(), ["C", "B", "A"]);
        assert_eq!(map.supergroups_top_down(), ["A", "B", "C"]);
    }

    #[test]
    fn add_attribute_requires_every_group() {
        let map = counties();
        let err = map
            .clone()
            .add_attribute(
                GroupType::Supergroup,
                "size",
                &values(&[("California", 40.0.into())]),
                ImputeAction::Ignore,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, ImputeError::IncompleteData { ref missing, .. } if missing == &["Washington"]));

        let map = map
            .add_attribute(
                GroupType::Supergroup,
                "size",
                &values(&[("California", 40.0.into()), ("Washington", 8.0.into())]),
                ImputeAction::Ignore,
                None,
            )
            .unwrap();
        assert_eq!(
            map.group("Washington").unwrap().attribute("size").unwrap().value(),
            &Value::from(8.0)
        );
        assert!(map.group("Skagit").unwrap().find_attribute("size").is_none());
    }

    #[test]
    fn filters_must_agree() {
        let map = counties();
        assert!(matches!(
            map.filters(GroupType::Supergroup),
            Err(ImputeError::MissingFilter { .. })
        ));
        let map = map
            .add_filters(GroupType::Supergroup, &["state".to_string()])
            .unwrap();
        assert_eq!(map.filters(GroupType::Supergroup).unwrap(), ["state"]);
    }

    fn state_map() -> GroupMap {
        counties()
            .add_attribute(
                GroupType::Supergroup,
                "state",
                &values(&[
                    ("California", "California".into()),
                    ("Washington", "Washington".into()),
                ]),
                ImputeAction::Ignore,
                None,
            )
            .unwrap()
            .add_filters(GroupType::Supergroup, &["state".to_string()])
            .unwrap()
    }

    fn state_record(state: &str, size: f64, rate: f64, count: f64) -> Record {
        let mut r = Record::new();
        r.insert("state".into(), state.into());
        r.insert("size".into(), size.into());
        r.insert("flower".into(), format!("{state} flower").into());
        r.insert("some_rate".into(), rate.into());
        r.insert("some_count".into(), count.into());
        r.insert("to_exclude".into(), "x".into());
        r
    }

    #[test]
    fn populate_from_records_classifies_keys() {
        let records = vec![
            state_record("California", 40.0, 1.2, 10.0),
            state_record("Washington", 8.0, 1.3, 20.0),
        ];
        let roles = KeyRoles::default()
            .with_exclude(["to_exclude", "size"])
            .with_count(["some_count"])
            .with_rate(["some_rate"])
            .with_copy(["flower"]);
        let map = state_map()
            .populate_from_records(&records, GroupType::Supergroup, &roles)
            .unwrap();

        let wa = map.group("Washington").unwrap();
        assert_eq!(wa.attribute("flower").unwrap().action(), ImputeAction::Copy);
        assert_eq!(
            wa.attribute("some_rate").unwrap().measurement(),
            Some(MeasurementType::Rate)
        );
        assert!(wa.find_attribute("size").is_none());

        let out = map.to_records(GroupType::Supergroup).unwrap();
        let keys: Vec<_> = out[0].keys().map(String::as_str).collect();
        assert_eq!(keys, ["state", "flower", "some_rate", "some_count"]);
        assert_eq!(out[1]["some_count"], Value::from(20.0));
    }

    #[test]
    fn populate_requires_exactly_one_row() {
        let records = vec![
            state_record("California", 40.0, 1.2, 10.0),
            state_record("California", 41.0, 1.2, 10.0),
            state_record("Washington", 8.0, 1.3, 20.0),
        ];
        let err = state_map()
            .populate_from_records(&records, GroupType::Supergroup, &KeyRoles::default())
            .unwrap_err();
        assert_eq!(
            err,
            ImputeError::AmbiguousRow {
                group: "California".into(),
                matches: 2
            }
        );

        let records = vec![state_record("California", 40.0, 1.2, 10.0)];
        let err = state_map()
            .populate_from_records(&records, GroupType::Supergroup, &KeyRoles::default())
            .unwrap_err();
        assert!(matches!(err, ImputeError::AmbiguousRow { matches: 0, .. }));
    }
}
