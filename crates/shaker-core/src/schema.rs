//! Keyword-based detection of the time, load and depth columns.

use crate::error::{Result, ShakerError};
use crate::models::{ColumnRoleMap, Role};

/// Canonical keywords for the time role, most specific first.
pub const TIME_KEYWORDS: &[&str] = &["timestamp", "time", "date"];
/// Canonical keywords for the load role, most specific first.
pub const LOAD_KEYWORDS: &[&str] = &["load", "shaker", "rpm"];
/// Canonical keywords for the depth role, most specific first.
pub const DEPTH_KEYWORDS: &[&str] = &["bit depth", "hole depth"];

/// Return the first column, in column order, that contains any of
/// `keywords` as a case-insensitive substring.
///
/// Keywords are checked in the caller's order for each column, so both orders
/// matter: put specific keywords before generic ones.
pub fn detect<'a, S: AsRef<str>>(columns: &'a [S], keywords: &[&str]) -> Option<&'a str> {
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    columns.iter().map(AsRef::as_ref).find(|column| {
        let lower = column.to_lowercase();
        keywords.iter().any(|k| lower.contains(k.as_str()))
    })
}

/// Role → keyword table driving [`SchemaDetector::resolve`].
#[derive(Debug, Clone)]
pub struct SchemaDetector {
    time: Vec<String>,
    load: Vec<String>,
    depth: Vec<String>,
}

impl Default for SchemaDetector {
    fn default() -> Self {
        Self {
            time: TIME_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            load: LOAD_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            depth: DEPTH_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SchemaDetector {
    /// Replace the keyword list for one role.
    pub fn with_keywords(mut self, role: Role, keywords: &[&str]) -> Self {
        let list = keywords.iter().map(|s| s.to_string()).collect();
        match role {
            Role::Time => self.time = list,
            Role::Load => self.load = list,
            Role::Depth => self.depth = list,
        }
        self
    }

    pub fn keywords(&self, role: Role) -> Vec<&str> {
        let list = match role {
            Role::Time => &self.time,
            Role::Load => &self.load,
            Role::Depth => &self.depth,
        };
        list.iter().map(String::as_str).collect()
    }

    /// Detect every role over `columns`. Missing roles are left unset.
    pub fn resolve<S: AsRef<str>>(&self, columns: &[S]) -> ColumnRoleMap {
        let find = |role| detect(columns, &self.keywords(role)).map(str::to_string);
        ColumnRoleMap::new(find(Role::Time), find(Role::Load), find(Role::Depth))
    }

    /// Like [`resolve`](Self::resolve), but fails when `time` or `load`
    /// cannot be found.
    pub fn resolve_required<S: AsRef<str>>(&self, columns: &[S]) -> Result<ColumnRoleMap> {
        let roles = self.resolve(columns);
        for role in [Role::Time, Role::Load] {
            if roles.get(role).is_none() {
                return Err(ShakerError::RequiredColumnMissing {
                    role: role.to_string(),
                    columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
                });
            }
        }
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_first_column_containing_any_keyword() {
        let columns = ["Bit Depth ft", "RPM Load"];
        assert_eq!(detect(&columns, LOAD_KEYWORDS), Some("RPM Load"));
    }

    #[test]
    fn test_detect_column_order_beats_keyword_order() {
        let columns = ["Hole Depth", "Bit Depth"];
        assert_eq!(detect(&columns, DEPTH_KEYWORDS), Some("Hole Depth"));
    }

    #[test]
    fn test_detect_case_insensitive() {
        let columns = ["date_utc", "SHAKER_PCT"];
        assert_eq!(detect(&columns, TIME_KEYWORDS), Some("date_utc"));
        assert_eq!(detect(&columns, LOAD_KEYWORDS), Some("SHAKER_PCT"));
    }

    #[test]
    fn test_detect_not_found() {
        let columns = ["Pump Pressure", "Flow In"];
        assert_eq!(detect(&columns, DEPTH_KEYWORDS), None);
    }

    #[test]
    fn test_detect_generic_keyword_false_positive() {
        // A generic keyword listed first can claim an unrelated column.
        let columns = ["Depth Offset", "Bit Depth"];
        assert_eq!(detect(&columns, &["depth"]), Some("Depth Offset"));
        assert_eq!(detect(&columns, &["bit depth"]), Some("Bit Depth"));
    }

    #[test]
    fn test_resolve_all_roles() {
        let columns = vec![
            "Timestamp".to_string(),
            "Shaker Load (%)".to_string(),
            "Hole Depth (ft)".to_string(),
        ];
        let roles = SchemaDetector::default().resolve(&columns);
        assert_eq!(roles.get(Role::Time), Some("Timestamp"));
        assert_eq!(roles.get(Role::Load), Some("Shaker Load (%)"));
        assert_eq!(roles.get(Role::Depth), Some("Hole Depth (ft)"));
    }

    #[test]
    fn test_resolve_required_missing_load() {
        let columns = ["Date", "Bit Depth"];
        let err = SchemaDetector::default()
            .resolve_required(&columns)
            .unwrap_err();
        match err {
            ShakerError::RequiredColumnMissing { role, columns } => {
                assert_eq!(role, "load");
                assert_eq!(columns, vec!["Date", "Bit Depth"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_required_depth_optional() {
        let columns = ["Date", "Load"];
        let roles = SchemaDetector::default().resolve_required(&columns).unwrap();
        assert!(!roles.has_depth());
    }

    #[test]
    fn test_with_keywords_overrides_role() {
        let detector = SchemaDetector::default().with_keywords(Role::Load, &["vibration"]);
        let roles = detector.resolve(&["Time", "Vibration G", "Load"]);
        assert_eq!(roles.get(Role::Load), Some("Vibration G"));
    }
}
