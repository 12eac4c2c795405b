use crate::shared::dns;
use std::fmt;
use std::fs;
use std::path::Path;

/// A single `zone_name = zone_file_path` entry within a `[default]` or named
/// view section.
#[derive(Debug, Clone)]
pub struct ZoneEntryConf {
    pub zone: dns::Name,
    pub file: String,
}

/// One `[default]` or named section: the zone entries that make up a view.
#[derive(Debug, Clone)]
pub struct ViewConf {
    pub name: dns::Name,
    pub zones: Vec<ZoneEntryConf>,
}

/// Configuration values obtained by parsing the sectioned configuration file.
/// `views` always contains exactly one entry named [`dns::Name::root`],
/// taken from the mandatory `[default]` section.
#[derive(Debug, Clone)]
pub struct Conf {
    pub port: u16,
    pub logfile: Option<String>,
    pub views: Vec<ViewConf>,
}

#[derive(Debug)]
pub enum ConfErr {
    Io(String),
    Syntax { line: usize, msg: String },
    InvalidPort(String),
    InvalidViewName { line: usize, name: String },
    InvalidZoneName { line: usize, name: String },
    MissingDefaultSection,
    UnreadableZoneFile { zone: String, file: String },
}

impl fmt::Display for ConfErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfErr::Io(msg) => write!(f, "cannot read configuration file: {}", msg),
            ConfErr::Syntax { line, msg } => write!(f, "line {}: {}", line, msg),
            ConfErr::InvalidPort(v) => write!(f, "invalid 'port' value: '{}'", v),
            ConfErr::InvalidViewName { line, name } => {
                write!(f, "line {}: invalid view name '{}'", line, name)
            }
            ConfErr::InvalidZoneName { line, name } => {
                write!(f, "line {}: invalid zone name '{}'", line, name)
            }
            ConfErr::MissingDefaultSection => write!(f, "configuration has no [default] section"),
            ConfErr::UnreadableZoneFile { zone, file } => {
                write!(f, "zone '{}': file '{}' does not exist or is not readable", zone, file)
            }
        }
    }
}

enum Entry {
    Section(String),
    KeyValue(String, String),
}

impl Conf {
    /// Read and parse the configuration from `path`. The format is a
    /// sectioned `key = value` layout:
    /// `[global]` carries `port` and `logfile`; `[default]` and any other
    /// section name carry `zone_name = zone_file_path` entries, the former
    /// for the root view and the latter for a named view. `;` and `#` start
    /// a comment running to the end of the line.
    pub fn from_file(path: &str) -> Result<Self, ConfErr> {
        let contents = fs::read_to_string(path).map_err(|err| ConfErr::Io(err.to_string()))?;
        let conf = Self::parse(&contents)?;
        conf.validate()?;
        Ok(conf)
    }

    fn parse(contents: &str) -> Result<Self, ConfErr> {
        let mut port: u16 = 53;
        let mut logfile: Option<String> = None;
        let mut views: Vec<ViewConf> = vec![];
        let mut current_section: Option<String> = None;

        for (idx, raw_line) in contents.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            match parse_line(line, line_no)? {
                Entry::Section(name) => {
                    current_section = Some(name.clone());
                    if !name.eq_ignore_ascii_case("global") && !name.eq_ignore_ascii_case("default") {
                        let view_name = dns::Name::from_string(&name).map_err(|_| ConfErr::InvalidViewName {
                            line: line_no,
                            name: name.clone(),
                        })?;
                        views.push(ViewConf { name: view_name, zones: vec![] });
                    }
                }
                Entry::KeyValue(key, value) => {
                    let section = current_section.as_deref().unwrap_or("");
                    if section.eq_ignore_ascii_case("global") {
                        if key.eq_ignore_ascii_case("port") {
                            port = value
                                .parse()
                                .map_err(|_| ConfErr::InvalidPort(value.clone()))?;
                        } else if key.eq_ignore_ascii_case("logfile") {
                            logfile = Some(value);
                        } else {
                            return Err(ConfErr::Syntax {
                                line: line_no,
                                msg: format!("unknown key '{}' in [global]", key),
                            });
                        }
                    } else if section.eq_ignore_ascii_case("default") {
                        let zone = dns::Name::from_string(&key).map_err(|_| ConfErr::InvalidZoneName {
                            line: line_no,
                            name: key.clone(),
                        })?;
                        default_view_zones(&mut views, &zone, value);
                    } else if !section.is_empty() {
                        let zone = dns::Name::from_string(&key).map_err(|_| ConfErr::InvalidZoneName {
                            line: line_no,
                            name: key.clone(),
                        })?;
                        let view = views
                            .iter_mut()
                            .find(|v| v.name.to_string().eq_ignore_ascii_case(section))
                            .expect("section entry pushed when the header was parsed");
                        view.zones.push(ZoneEntryConf { zone, file: value });
                    } else {
                        return Err(ConfErr::Syntax {
                            line: line_no,
                            msg: "key = value entry outside of any section".to_string(),
                        });
                    }
                }
            }
        }

        if !views.iter().any(|v| v.name == dns::Name::root()) {
            return Err(ConfErr::MissingDefaultSection);
        }

        Ok(Conf { port, logfile, views })
    }

    /// Check that every zone file referenced by every view is readable.
    fn validate(&self) -> Result<(), ConfErr> {
        for view in &self.views {
            for entry in &view.zones {
                if !Path::new(&entry.file).is_file() {
                    return Err(ConfErr::UnreadableZoneFile {
                        zone: entry.zone.to_string(),
                        file: entry.file.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

// `[default]` zones are collected under a dedicated root-named ViewConf so
// the default view is never confused with a named view also keyed at root.
fn default_view_zones(views: &mut Vec<ViewConf>, zone: &dns::Name, file: String) {
    if let Some(view) = views.iter_mut().find(|v| v.name == dns::Name::root()) {
        view.zones.push(ZoneEntryConf { zone: zone.clone(), file });
        return;
    }
    views.push(ViewConf {
        name: dns::Name::root(),
        zones: vec![ZoneEntryConf { zone: zone.clone(), file }],
    });
}

fn strip_comment(line: &str) -> &str {
    match line.find([';', '#']) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<Entry, ConfErr> {
    if let Some(stripped) = line.strip_prefix('[') {
        let name = stripped.strip_suffix(']').ok_or_else(|| ConfErr::Syntax {
            line: line_no,
            msg: "unterminated section header".to_string(),
        })?;
        return Ok(Entry::Section(name.trim().to_string()));
    }

    let (key, value) = line.split_once('=').ok_or_else(|| ConfErr::Syntax {
        line: line_no,
        msg: "expected 'key = value' or a '[section]' header".to_string(),
    })?;
    Ok(Entry::KeyValue(key.trim().to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> dns::Name {
        dns::Name::from_string(s).unwrap()
    }

    #[test]
    fn parses_global_and_default_sections() {
        let text = "\
[global]
port = 5353
logfile = /var/log/viewdns.log

[default]
example. = zones/example.zone
";
        let conf = Conf::parse(text).unwrap();
        assert_eq!(conf.port, 5353);
        assert_eq!(conf.logfile.as_deref(), Some("/var/log/viewdns.log"));
        assert_eq!(conf.views.len(), 1);
        assert_eq!(conf.views[0].name, dns::Name::root());
        assert_eq!(conf.views[0].zones[0].zone, name("example."));
        assert_eq!(conf.views[0].zones[0].file, "zones/example.zone");
    }

    #[test]
    fn defaults_port_to_53_when_global_section_absent() {
        let text = "[default]\nexample. = zones/example.zone\n";
        let conf = Conf::parse(text).unwrap();
        assert_eq!(conf.port, 53);
        assert!(conf.logfile.is_none());
    }

    #[test]
    fn registers_named_views_separately_from_default() {
        let text = "\
[default]
example. = zones/example.zone

[internal.]
example. = zones/internal-example.zone
corp.example. = zones/corp.zone
";
        let conf = Conf::parse(text).unwrap();
        assert_eq!(conf.views.len(), 2);
        let internal = conf.views.iter().find(|v| v.name == name("internal.")).unwrap();
        assert_eq!(internal.zones.len(), 2);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let text = "\
; a leading comment
[global]
port = 53 ; inline comment
# another comment

[default]
example. = zones/example.zone
";
        let conf = Conf::parse(text).unwrap();
        assert_eq!(conf.port, 53);
    }

    #[test]
    fn missing_default_section_is_an_error() {
        let text = "[internal.]\nexample. = zones/example.zone\n";
        assert!(matches!(Conf::parse(text), Err(ConfErr::MissingDefaultSection)));
    }

    #[test]
    fn invalid_port_is_an_error() {
        let text = "[global]\nport = not-a-number\n\n[default]\nexample. = zones/example.zone\n";
        assert!(matches!(Conf::parse(text), Err(ConfErr::InvalidPort(_))));
    }

    #[test]
    fn invalid_view_name_is_an_error() {
        let text = "[..]\nexample. = zones/example.zone\n";
        assert!(matches!(Conf::parse(text), Err(ConfErr::InvalidViewName { .. })));
    }

    #[test]
    fn key_value_outside_section_is_an_error() {
        let text = "port = 53\n";
        assert!(matches!(Conf::parse(text), Err(ConfErr::Syntax { .. })));
    }
}
