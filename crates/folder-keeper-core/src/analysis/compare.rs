use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::storage::FileItem;

/// How a route's copies relate across the compared folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Present in exactly one folder.
    UniqueToOne,
    /// Present in two or more folders, all with the same checksum.
    Matching,
    /// Present in two or more folders with differing checksums.
    Mismatched,
}

/// One folder's inventory reduced to route -> checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparedFolder {
    pub folder_id: Uuid,
    pub checksums: BTreeMap<String, String>,
}

impl ComparedFolder {
    pub fn new(folder_id: Uuid, checksums: BTreeMap<String, String>) -> Self {
        Self {
            folder_id,
            checksums,
        }
    }

    pub fn from_items(folder_id: Uuid, items: &[FileItem]) -> Self {
        Self {
            folder_id,
            checksums: items
                .iter()
                .map(|item| (item.relative_route.clone(), item.content_checksum.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteComparison {
    pub route: String,
    pub class: RouteClass,
    /// The primary folder lacks this route while another folder has it.
    pub missing_from_primary: bool,
    /// One cell per compared folder, in input order.
    pub checksums: Vec<Option<String>>,
}

impl RouteComparison {
    pub fn present_count(&self) -> usize {
        self.checksums.iter().filter(|c| c.is_some()).count()
    }
}

/// Route-by-route alignment of N folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub folder_ids: Vec<Uuid>,
    pub primary: Option<Uuid>,
    /// Sorted by route.
    pub rows: Vec<RouteComparison>,
}

impl Comparison {
    pub fn unified_routes(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.route.as_str()).collect()
    }

    pub fn routes_with(&self, class: RouteClass) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|r| r.class == class)
            .map(|r| r.route.as_str())
            .collect()
    }

    pub fn missing_from_primary(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|r| r.missing_from_primary)
            .map(|r| r.route.as_str())
            .collect()
    }

    pub fn row(&self, route: &str) -> Option<&RouteComparison> {
        self.rows
            .binary_search_by(|r| r.route.as_str().cmp(route))
            .ok()
            .map(|i| &self.rows[i])
    }
}

/// Align folders by relative route and classify every route.
///
/// Pure: no I/O, no stored state. `primary` is ignored unless it names one of
/// the supplied folders.
pub fn compare(folders: &[ComparedFolder], primary: Option<Uuid>) -> Comparison {
    let primary_index = primary.and_then(|id| folders.iter().position(|f| f.folder_id == id));

    let unified: BTreeSet<&str> = folders
        .iter()
        .flat_map(|f| f.checksums.keys().map(String::as_str))
        .collect();

    let rows = unified
        .into_iter()
        .map(|route| {
            let checksums: Vec<Option<String>> = folders
                .iter()
                .map(|f| f.checksums.get(route).cloned())
                .collect();

            let distinct: BTreeSet<&String> = checksums.iter().flatten().collect();
            let present = checksums.iter().filter(|c| c.is_some()).count();
            let class = if present <= 1 {
                RouteClass::UniqueToOne
            } else if distinct.len() == 1 {
                RouteClass::Matching
            } else {
                RouteClass::Mismatched
            };

            let missing_from_primary = primary_index.is_some_and(|i| checksums[i].is_none());

            RouteComparison {
                route: route.to_string(),
                class,
                missing_from_primary,
                checksums,
            }
        })
        .collect();

    Comparison {
        folder_ids: folders.iter().map(|f| f.folder_id).collect(),
        primary: primary_index.map(|i| folders[i].folder_id),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn folder(entries: &[(&str, &str)]) -> ComparedFolder {
        ComparedFolder::new(
            Uuid::new_v4(),
            entries
                .iter()
                .map(|(r, c)| (r.to_string(), c.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_two_folder_classification() {
        let a = folder(&[("x", "c1"), ("y", "c2")]);
        let b = folder(&[("x", "c1"), ("z", "c3")]);

        let result = compare(&[a, b], None);

        assert_eq!(result.unified_routes(), vec!["x", "y", "z"]);
        assert_eq!(result.row("x").unwrap().class, RouteClass::Matching);
        assert_eq!(result.row("y").unwrap().class, RouteClass::UniqueToOne);
        assert_eq!(result.row("z").unwrap().class, RouteClass::UniqueToOne);
        assert!(result.missing_from_primary().is_empty());
    }

    #[test]
    fn test_mismatch_among_three() {
        let a = folder(&[("doc", "1")]);
        let b = folder(&[("doc", "1")]);
        let c = folder(&[("doc", "2")]);

        let result = compare(&[a, b, c], None);
        assert_eq!(result.routes_with(RouteClass::Mismatched), vec!["doc"]);
        assert_eq!(result.row("doc").unwrap().present_count(), 3);
    }

    #[test]
    fn test_missing_from_primary_is_independent_of_class() {
        let primary = folder(&[("shared", "s")]);
        let b = folder(&[("shared", "s"), ("both", "q")]);
        let c = folder(&[("both", "q"), ("only_c", "o")]);
        let primary_id = primary.folder_id;

        let result = compare(&[primary, b, c], Some(primary_id));

        assert_eq!(result.primary, Some(primary_id));
        assert_eq!(result.missing_from_primary(), vec!["both", "only_c"]);
        assert_eq!(result.row("both").unwrap().class, RouteClass::Matching);
        assert_eq!(result.row("only_c").unwrap().class, RouteClass::UniqueToOne);
        assert!(!result.row("shared").unwrap().missing_from_primary);
    }

    #[test]
    fn test_unknown_primary_is_ignored() {
        let a = folder(&[("x", "1")]);
        let b = folder(&[("y", "2")]);
        let result = compare(&[a, b], Some(Uuid::new_v4()));
        assert_eq!(result.primary, None);
        assert!(result.missing_from_primary().is_empty());
    }

    #[test]
    fn test_cells_follow_input_order() {
        let a = folder(&[("x", "1")]);
        let b = folder(&[("x", "2")]);
        let result = compare(&[a, b], None);
        assert_eq!(
            result.row("x").unwrap().checksums,
            vec![Some("1".to_string()), Some("2".to_string())]
        );
    }
}
