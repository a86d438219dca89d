//! Render-ready ordering of categories and their diagrams
//!
//! Categories and diagrams share one flat drag-and-drop keyspace. Keys are
//! typed here and only turned into strings (`category-<id>`,
//! `diagram-default#<id>`, `diagram-category-<cid>#<id>`) at the edges.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{Category, CategoryLink, Diagram};
use crate::store::Stores;

const CATEGORY_PREFIX: &str = "category-";
const DIAGRAM_PREFIX: &str = "diagram-";
const DEFAULT_KEY: &str = "default";

/// A bucket of diagrams: a real category or the implicit default bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CategoryKey {
    /// Diagrams without a (live) category link
    Default,
    Category(String),
}

impl CategoryKey {
    pub fn category_id(&self) -> Option<&str> {
        match self {
            CategoryKey::Default => None,
            CategoryKey::Category(id) => Some(id),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, CategoryKey::Default)
    }
}

impl From<Option<&str>> for CategoryKey {
    fn from(id: Option<&str>) -> Self {
        match id {
            Some(id) => CategoryKey::Category(id.to_string()),
            None => CategoryKey::Default,
        }
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryKey::Default => write!(f, "{}", DEFAULT_KEY),
            CategoryKey::Category(id) => write!(f, "{}{}", CATEGORY_PREFIX, id),
        }
    }
}

/// A diagram as placed in a particular bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagramKey {
    pub parent: CategoryKey,
    pub id: String,
}

impl DiagramKey {
    pub fn new(parent: CategoryKey, id: impl Into<String>) -> Self {
        Self {
            parent,
            id: id.into(),
        }
    }
}

impl fmt::Display for DiagramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}#{}", DIAGRAM_PREFIX, self.parent, self.id)
    }
}

/// Anything that can be dragged or dropped onto
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DndId {
    /// A category header; `CategoryKey::Default` is the default bucket's anchor
    Category(CategoryKey),
    Diagram(DiagramKey),
}

impl fmt::Display for DndId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DndId::Category(CategoryKey::Default) => {
                write!(f, "{}{}", CATEGORY_PREFIX, DEFAULT_KEY)
            }
            DndId::Category(key) => write!(f, "{}", key),
            DndId::Diagram(key) => write!(f, "{}", key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid drag-and-drop key: {0}")]
pub struct KeyParseError(pub String);

impl FromStr for CategoryKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == DEFAULT_KEY {
            return Ok(CategoryKey::Default);
        }
        match s.strip_prefix(CATEGORY_PREFIX) {
            Some(id) if !id.is_empty() => Ok(CategoryKey::Category(id.to_string())),
            _ => Err(KeyParseError(s.to_string())),
        }
    }
}

impl FromStr for DndId {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(DIAGRAM_PREFIX) {
            let (parent, id) = rest
                .rsplit_once('#')
                .ok_or_else(|| KeyParseError(s.to_string()))?;
            if id.is_empty() {
                return Err(KeyParseError(s.to_string()));
            }
            let parent = parent
                .parse::<CategoryKey>()
                .map_err(|_| KeyParseError(s.to_string()))?;
            return Ok(DndId::Diagram(DiagramKey::new(parent, id)));
        }
        if let Some(id) = s.strip_prefix(CATEGORY_PREFIX) {
            return match id {
                "" => Err(KeyParseError(s.to_string())),
                DEFAULT_KEY => Ok(DndId::Category(CategoryKey::Default)),
                _ => Ok(DndId::Category(CategoryKey::Category(id.to_string()))),
            };
        }
        Err(KeyParseError(s.to_string()))
    }
}

/// Ordered categories plus, per bucket, its ordered diagrams
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryView {
    /// Real categories by ascending position
    pub category_ids: Vec<CategoryKey>,
    /// Buckets that hold at least one diagram; the default bucket is
    /// always present
    pub diagram_ids_by_category: BTreeMap<CategoryKey, Vec<DiagramKey>>,
}

impl CategoryView {
    /// Diagrams of a bucket, empty when the bucket has none
    pub fn bucket(&self, key: &CategoryKey) -> &[DiagramKey] {
        self.diagram_ids_by_category
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn bucket_mut(&mut self, key: &CategoryKey) -> &mut Vec<DiagramKey> {
        self.diagram_ids_by_category.entry(key.clone()).or_default()
    }

    /// Where a diagram currently sits: its bucket and index
    pub fn locate(&self, diagram_id: &str) -> Option<(&CategoryKey, usize)> {
        self.diagram_ids_by_category.iter().find_map(|(key, list)| {
            list.iter()
                .position(|d| d.id == diagram_id)
                .map(|index| (key, index))
        })
    }

    pub fn diagram_count(&self) -> usize {
        self.diagram_ids_by_category.values().map(Vec::len).sum()
    }
}

/// View model state as seen by a renderer
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    /// At least one store has not finished its first load
    Loading,
    Ready(CategoryView),
}

impl ViewState {
    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    /// The derived view, or an empty one while loading
    pub fn view(&self) -> CategoryView {
        match self {
            ViewState::Loading => CategoryView::default(),
            ViewState::Ready(view) => view.clone(),
        }
    }
}

/// Derives the view from the stores, or `Loading` until all have loaded
pub fn view_state(stores: &Stores) -> ViewState {
    if !stores.all_loaded() {
        return ViewState::Loading;
    }
    ViewState::Ready(derive_view(
        stores.categories.items(),
        stores.diagrams.items(),
        stores.links.items(),
    ))
}

/// Combines the three store snapshots into one ordered structure.
///
/// Trashed diagrams are skipped. A diagram's first link to an existing
/// category decides its bucket; anything else lands in the default bucket.
pub fn derive_view(
    categories: &[Category],
    diagrams: &[Diagram],
    links: &[CategoryLink],
) -> CategoryView {
    let mut sorted: Vec<&Category> = categories.iter().collect();
    sorted.sort_by(|a, b| a.position.total_cmp(&b.position));

    let known: HashSet<&str> = categories.iter().map(|c| c.id.as_str()).collect();
    let mut link_of: HashMap<&str, &str> = HashMap::new();
    for link in links.iter().filter(|l| known.contains(l.category_id.as_str())) {
        link_of
            .entry(link.diagram_id.as_str())
            .or_insert(link.category_id.as_str());
    }

    let mut live: Vec<&Diagram> = diagrams.iter().filter(|d| !d.is_deleted).collect();
    live.sort_by(|a, b| a.position.total_cmp(&b.position));

    let mut buckets: BTreeMap<CategoryKey, Vec<DiagramKey>> = BTreeMap::new();
    buckets.insert(CategoryKey::Default, Vec::new());
    for diagram in live {
        let parent = CategoryKey::from(link_of.get(diagram.id.as_str()).copied());
        buckets
            .entry(parent.clone())
            .or_default()
            .push(DiagramKey::new(parent, diagram.id.clone()));
    }

    CategoryView {
        category_ids: sorted
            .into_iter()
            .map(|c| CategoryKey::Category(c.id.clone()))
            .collect(),
        diagram_ids_by_category: buckets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn category(id: &str, position: f64) -> Category {
        let mut c = Category::new(id.to_uppercase(), position);
        c.id = id.to_string();
        c
    }

    fn diagram(id: &str, position: f64) -> Diagram {
        let mut d = Diagram::new(id.to_uppercase(), String::new(), position);
        d.id = id.to_string();
        d
    }

    fn strings(view: &CategoryView) -> (Vec<String>, Vec<(String, Vec<String>)>) {
        (
            view.category_ids.iter().map(|k| k.to_string()).collect(),
            view.diagram_ids_by_category
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|d| d.to_string()).collect()))
                .collect(),
        )
    }

    #[test]
    fn test_scenario_unlinked_diagrams_land_in_default() {
        let categories = vec![category("c1", 1000.0), category("c2", 2000.0)];
        let diagrams = vec![diagram("d1", 0.0), diagram("d2", 0.0)];

        let view = derive_view(&categories, &diagrams, &[]);
        let (category_ids, buckets) = strings(&view);

        assert_eq!(category_ids, vec!["category-c1", "category-c2"]);
        assert_eq!(
            buckets,
            vec![(
                "default".to_string(),
                vec![
                    "diagram-default#d1".to_string(),
                    "diagram-default#d2".to_string()
                ]
            )]
        );
    }

    #[test]
    fn test_categories_sorted_and_deterministic() {
        let categories = vec![
            category("z", 3000.0),
            category("x", 1000.0),
            category("y", 2500.5),
        ];
        let first = derive_view(&categories, &[], &[]);
        let second = derive_view(&categories, &[], &[]);
        assert_eq!(first, second);
        assert_eq!(strings(&first).0, vec!["category-x", "category-y", "category-z"]);
    }

    #[test]
    fn test_every_live_diagram_in_exactly_one_bucket() {
        let categories = vec![category("a", 1000.0), category("b", 2000.0)];
        let mut diagrams: Vec<Diagram> = (0..10)
            .map(|i| diagram(&format!("d{}", i), (10 - i) as f64))
            .collect();
        diagrams[3].is_deleted = true;
        let links = vec![
            CategoryLink::new("d0", "a"),
            CategoryLink::new("d1", "b"),
            CategoryLink::new("d2", "a"),
            CategoryLink::new("d3", "a"),
            CategoryLink::new("d1", "a"),
        ];

        let view = derive_view(&categories, &diagrams, &links);
        assert_eq!(view.diagram_count(), 9);

        let mut seen = HashSet::new();
        for list in view.diagram_ids_by_category.values() {
            for key in list {
                assert!(seen.insert(key.id.clone()), "{} appears twice", key.id);
            }
        }
        assert!(!seen.contains("d3"));
        // First link wins for d1
        assert_eq!(view.locate("d1").unwrap().0, &CategoryKey::Category("b".into()));
    }

    #[test]
    fn test_buckets_follow_diagram_position() {
        let categories = vec![category("a", 1000.0)];
        let diagrams = vec![diagram("late", 3000.0), diagram("early", 1000.0)];
        let links = vec![
            CategoryLink::new("late", "a"),
            CategoryLink::new("early", "a"),
        ];
        let view = derive_view(&categories, &diagrams, &links);
        let ids: Vec<&str> = view
            .bucket(&CategoryKey::Category("a".into()))
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_link_to_deleted_category_falls_back_to_default() {
        let diagrams = vec![diagram("d", 1000.0)];
        let links = vec![CategoryLink::new("d", "gone")];
        let view = derive_view(&[], &diagrams, &links);
        assert_eq!(view.bucket(&CategoryKey::Default).len(), 1);
        assert!(view.bucket(&CategoryKey::Category("gone".into())).is_empty());
    }

    #[test]
    fn test_empty_content_does_not_block_derivation() {
        let mut d = diagram("blank", 1000.0);
        d.content = String::new();
        let view = derive_view(&[], &[d], &[]);
        assert_eq!(view.diagram_count(), 1);
    }

    #[test]
    fn test_view_state_loading_until_all_stores_loaded() {
        use crate::db::SqliteBackend;
        use std::sync::Arc;

        let mut stores = Stores::new(Arc::new(SqliteBackend::in_memory().unwrap()));
        assert!(view_state(&stores).is_loading());

        stores.categories.load_all().unwrap();
        stores.diagrams.load_all().unwrap();
        assert!(view_state(&stores).is_loading());

        stores.links.load_all().unwrap();
        let state = view_state(&stores);
        assert!(!state.is_loading());
        assert!(state.view().bucket(&CategoryKey::Default).is_empty());
    }

    #[test]
    fn test_key_strings_parse_back() {
        let keys = [
            "category-c1",
            "category-default",
            "diagram-default#d1",
            "diagram-category-c1#d2",
        ];
        for key in keys {
            let parsed: DndId = key.parse().unwrap();
            assert_eq!(parsed.to_string(), key);
        }
        assert_eq!(
            "diagram-category-c1#d2".parse::<DndId>().unwrap(),
            DndId::Diagram(DiagramKey::new(CategoryKey::Category("c1".into()), "d2"))
        );
    }

    #[test]
    fn test_malformed_keys_rejected() {
        for key in ["", "category-", "diagram-default", "diagram-nope#d", "widget-1"] {
            assert!(key.parse::<DndId>().is_err(), "{} should not parse", key);
        }
    }

    /// Random workspace: categories at distinct positions, diagrams with
    /// some in the trash, links that may point at missing categories or
    /// repeat a diagram
    fn workspace() -> impl Strategy<Value = (Vec<Category>, Vec<Diagram>, Vec<CategoryLink>)> {
        (
            prop::collection::hash_set(-100_000i64..100_000, 0..12),
            prop::collection::vec((-1e6f64..1e6, any::<bool>()), 0..30),
            prop::collection::vec((0usize..30, 0usize..16), 0..40),
        )
            .prop_map(|(category_positions, diagram_specs, link_specs)| {
                let categories: Vec<Category> = category_positions
                    .into_iter()
                    .enumerate()
                    .map(|(i, p)| category(&format!("c{}", i), p as f64 / 4.0))
                    .collect();
                let diagrams: Vec<Diagram> = diagram_specs
                    .iter()
                    .enumerate()
                    .map(|(i, (position, deleted))| {
                        let mut d = diagram(&format!("d{}", i), *position);
                        d.is_deleted = *deleted;
                        d
                    })
                    .collect();
                let links = link_specs
                    .into_iter()
                    .filter(|(d, _)| *d < diagrams.len())
                    .map(|(d, c)| CategoryLink::new(format!("d{}", d), format!("c{}", c)))
                    .collect();
                (categories, diagrams, links)
            })
    }

    proptest! {
        #[test]
        fn categories_sorted_and_stable((categories, diagrams, links) in workspace()) {
            let view = derive_view(&categories, &diagrams, &links);
            prop_assert_eq!(&view, &derive_view(&categories, &diagrams, &links));
            prop_assert_eq!(view.category_ids.len(), categories.len());

            let positions: Vec<f64> = view
                .category_ids
                .iter()
                .map(|key| {
                    let id = key.category_id().unwrap();
                    categories.iter().find(|c| c.id == id).unwrap().position
                })
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);
        }

        #[test]
        fn live_diagrams_fill_exactly_one_bucket((categories, diagrams, links) in workspace()) {
            let view = derive_view(&categories, &diagrams, &links);
            let live: HashSet<&str> = diagrams
                .iter()
                .filter(|d| !d.is_deleted)
                .map(|d| d.id.as_str())
                .collect();
            prop_assert_eq!(view.diagram_count(), live.len());

            let mut seen = HashSet::new();
            for (bucket, keys) in &view.diagram_ids_by_category {
                if let CategoryKey::Category(id) = bucket {
                    prop_assert!(categories.iter().any(|c| &c.id == id));
                }
                for key in keys {
                    prop_assert_eq!(&key.parent, bucket);
                    prop_assert!(live.contains(key.id.as_str()));
                    prop_assert!(seen.insert(key.id.clone()), "{} appears twice", key.id);
                }
            }
        }
    }
}
