use crate::nameserver::zones::errors::*;
use crate::nameserver::zones::parser_auth::*;
use crate::shared::dns;
use std::collections::{HashMap, HashSet};

/// The configuration options needed to parse a single zone file via
/// [parse_zone_files]. Every zone loaded this way — whether it belongs to
/// the default view or a named view — goes through the same mandatory
/// apex-SOA/apex-NS validation.
#[derive(Debug)]
pub struct ParsingParams {
    pub file_path: String,
    pub zone: dns::Name,
    pub starting_ttl: u32,
}

/// Parse a zone file into a [`Zone`], validating apex invariants and
/// computing `all_names`.
pub fn parse_zone_files(zone_conf: ParsingParams) -> Result<Zone, ParseErrCtx> {
    let mut zone = parse_auth_zone_file(&zone_conf)?;
    if let Err(err) = validate_zone(&zone) {
        return Err((err, format!("validating zone: {}", zone.origin)));
    }
    zone.compute_all_names();
    Ok(zone)
}

/// Validate entries found in the zone file. The following checks are performed:
/// - NS records must be present (SOA record is already checked during parsing),
/// - NS records must be owned by the top node (apex) of the zone.
fn validate_zone(zone: &Zone) -> Result<(), ParseErr> {
    let ns_records = zone.get_all_of_type(dns::RecordType::NS);
    if ns_records.is_empty() {
        let err_msg = format!("no NS records in zone file '{}'", zone.origin);
        return Err(ParseErr::MalformedZone(err_msg));
    }

    for ns_record in ns_records {
        if ns_record.node() != &zone.origin {
            let err_msg = format!("NS record must be in top node '{}'", zone.origin);
            return Err(ParseErr::NameNotInRootNode(err_msg));
        }
    }

    Ok(())
}

/// A loaded zone: an origin [`dns::Name`] plus a Name→Node mapping for every
/// explicitly populated owner, and a derived `all_names` set (every name
/// that exists as an ancestor-or-equal of some populated owner, up to and
/// including the origin — this includes empty non-terminals). Used by the
/// responder to tell NODATA from NXDOMAIN.
pub struct Zone {
    records: HashMap<dns::Name, HashMap<dns::RecordType, Vec<dns::Record>>>,
    all_names: HashSet<dns::Name>,
    pub origin: dns::Name,
}

impl Zone {
    /// Create a new, empty [`Zone`] rooted at `origin`.
    pub fn new(origin: &dns::Name) -> Self {
        Self {
            records: Default::default(),
            all_names: Default::default(),
            origin: origin.clone(),
        }
    }

    /// Insert a new [`dns::Record`] into the zone records collection.
    pub fn insert(&mut self, record: dns::Record) {
        let outer_entry = self.records.entry(record.node().clone());
        let inner_map = outer_entry.or_default();
        let inner_entry = inner_map.entry(record.record_type());
        let records = inner_entry.or_default();
        records.push(record);
    }

    /// Get the &[`dns::Record`] corresponding to the passed node and record type.
    pub fn get(&self, node: &dns::Name, kind: dns::RecordType) -> Option<&Vec<dns::Record>> {
        let inner_map = self.records.get(node)?;
        let records = inner_map.get(&kind)?;
        debug_assert!(records.iter().all(|r| r.record_type() == kind));
        debug_assert!(records.iter().all(|r| r.node() == node));
        assert!(!records.is_empty());
        Some(records)
    }

    /// Get every RRset present at `node`, regardless of type (used to answer
    /// ANY queries).
    pub fn get_node(&self, node: &dns::Name) -> Option<&HashMap<dns::RecordType, Vec<dns::Record>>> {
        self.records.get(node)
    }

    /// Get all [`dns::Record`] of the record type passed in, returned as references.
    pub fn get_all_of_type(&self, kind: dns::RecordType) -> Vec<&dns::Record> {
        self.records
            .iter()
            .map(|(_, r)| r.get(&kind))
            .filter_map(|r| r)
            .flatten()
            .collect()
    }

    /// Merge another [`Zone`] into the current one (used while processing
    /// `$INCLUDE` directives during parsing).
    pub fn extend(&mut self, other: Self) {
        for (_, inner) in other.records {
            for (_, records) in inner {
                for record in records {
                    self.insert(record)
                }
            }
        }
    }

    /// Reports whether `name` exists in the zone, either as a populated
    /// owner or as an empty non-terminal ancestor of one.
    pub fn contains_name(&self, name: &dns::Name) -> bool {
        self.all_names.contains(name)
    }

    // Compute `all_names`: for every populated owner, insert it and every
    // strict ancestor up to (and including) the origin.
    pub(crate) fn compute_all_names(&mut self) {
        let mut all_names = HashSet::new();
        for owner in self.records.keys() {
            let mut current = owner.clone();
            loop {
                if !all_names.insert(current.clone()) && current == self.origin {
                    break;
                }
                if current == self.origin {
                    break;
                }
                match current.parent() {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }
        all_names.insert(self.origin.clone());
        self.all_names = all_names;
    }
}

/// An ordered mapping from zone-apex name to [`Zone`]. Supports exact lookup
/// and deepest-suffix match against a query name.
#[derive(Default)]
pub struct View {
    zones: HashMap<dns::Name, Zone>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, zone: Zone) {
        self.zones.insert(zone.origin.clone(), zone);
    }

    /// Exact lookup of a zone by its apex name.
    pub fn get(&self, apex: &dns::Name) -> Option<&Zone> {
        self.zones.get(apex)
    }

    /// Returns the zone whose apex is the longest suffix of `qname` among
    /// the apexes present in this view, or `None` if the view is empty or
    /// no apex is a suffix of `qname`.
    pub fn deepest_match(&self, qname: &dns::Name) -> Option<&Zone> {
        self.zones
            .values()
            .filter(|zone| qname.is_in_zone(&zone.origin))
            .max_by_key(|zone| zone.origin.label_count())
    }
}

/// Mapping from view name to [`View`]. Always contains the root-keyed
/// default view; lookups for missing keys fall back to it.
pub struct ViewRegistry {
    views: HashMap<dns::Name, View>,
}

impl ViewRegistry {
    /// Build a registry with `default` installed as the mandatory
    /// root-keyed view.
    pub fn new(default: View) -> Self {
        let mut views = HashMap::new();
        views.insert(dns::Name::root(), default);
        Self { views }
    }

    /// Register a named, non-default view.
    pub fn insert(&mut self, name: dns::Name, view: View) {
        self.views.insert(name, view);
    }

    /// Exact lookup by view name, with no fallback.
    pub fn get_exact(&self, name: &dns::Name) -> Option<&View> {
        self.views.get(name)
    }

    /// Lookup by view name, falling back to the root-keyed default view
    /// when `name` has no exact entry.
    pub fn get_or_default(&self, name: &dns::Name) -> &View {
        self.views.get(name).unwrap_or_else(|| self.default())
    }

    /// The mandatory root-keyed default view.
    pub fn default(&self) -> &View {
        self.views
            .get(&dns::Name::root())
            .expect("ViewRegistry invariant: root view always present")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> dns::Name {
        dns::Name::from_string(s).unwrap()
    }

    fn soa_ns_zone(origin: &str) -> Zone {
        let origin = name(origin);
        let mut zone = Zone::new(&origin);
        zone.insert(dns::Record::SOA {
            node: origin.clone(),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            ns_name: name(&format!("ns1.{}", origin)),
            ml_name: name(&format!("hostmaster.{}", origin)),
            serial: 1,
            refresh: 3600,
            retry: 600,
            expire: 86400,
            minimum: 60,
        });
        zone.insert(dns::Record::NS {
            node: origin.clone(),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            name: name(&format!("ns1.{}", origin)),
        });
        zone
    }

    #[test]
    fn all_names_includes_empty_non_terminals() {
        let mut zone = soa_ns_zone("example.");
        zone.insert(dns::Record::TXT {
            node: name("leaf.a.b.example."),
            class: dns::Class::IN,
            ttl: 3600,
            data_len: 0,
            txts: vec!["x".to_string()],
        });
        zone.compute_all_names();

        assert!(zone.contains_name(&name("leaf.a.b.example.")));
        assert!(zone.contains_name(&name("a.b.example.")));
        assert!(zone.contains_name(&name("b.example.")));
        assert!(zone.contains_name(&name("example.")));
        assert!(!zone.contains_name(&name("missing.example.")));
    }

    #[test]
    fn view_deepest_match_prefers_longer_apex() {
        let mut view = View::new();
        view.insert(soa_ns_zone("example."));
        view.insert(soa_ns_zone("deep.example."));

        let deep = view.deepest_match(&name("x.deep.example.")).unwrap();
        assert_eq!(deep.origin, name("deep.example."));

        let top = view.deepest_match(&name("x.example.")).unwrap();
        assert_eq!(top.origin, name("example."));

        assert!(view.deepest_match(&name("other.test.")).is_none());
    }

    #[test]
    fn view_registry_falls_back_to_root() {
        let mut root_view = View::new();
        root_view.insert(soa_ns_zone("example."));
        let registry = ViewRegistry::new(root_view);

        assert!(registry.get_exact(&name("vb.")).is_none());
        let fallback = registry.get_or_default(&name("vb."));
        assert!(fallback.get(&name("example.")).is_some());
    }
}
