use serde::Serialize;
use std::collections::HashMap;

use super::reorder::sort_by_position;
use crate::models::{MenuCategory, MenuItem};

/// Bucket name for items with no category or a deleted one.
pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuSection {
    pub name: String,
    /// First category carrying this name; `None` for the uncategorized bucket.
    pub category_id: Option<i64>,
    pub items: Vec<MenuItem>,
}

/// Groups `items` by resolved category name for display.
///
/// Sections follow ascending category position and the uncategorized bucket
/// comes last, unless a category already carries that name, in which case
/// the orphaned items join it. Categories without items produce no section.
pub fn group_by_category(items: &[MenuItem], categories: &[MenuCategory]) -> Vec<MenuSection> {
    let mut ordered: Vec<&MenuCategory> = categories.iter().collect();
    ordered.sort_by_key(|c| c.position);

    let names: HashMap<i64, &str> = categories.iter().map(|c| (c.id, c.name.as_str())).collect();

    let mut sections: Vec<MenuSection> = Vec::new();
    for category in ordered {
        if !sections.iter().any(|s| s.name == category.name) {
            sections.push(MenuSection {
                name: category.name.clone(),
                category_id: Some(category.id),
                items: Vec::new(),
            });
        }
    }

    let mut orphans = Vec::new();
    for item in items {
        let name = item.category_id.and_then(|id| names.get(&id).copied());
        let section = match name {
            Some(name) => sections.iter_mut().find(|s| s.name == name),
            None => None,
        };
        match section {
            Some(section) => section.items.push(item.clone()),
            None => orphans.push(item.clone()),
        }
    }
    // A category may itself be called "uncategorized"; names stay unique.
    match sections.iter_mut().find(|s| s.name == UNCATEGORIZED) {
        Some(section) => section.items.extend(orphans),
        None => sections.push(MenuSection {
            name: UNCATEGORIZED.to_string(),
            category_id: None,
            items: orphans,
        }),
    }

    sections.retain(|s| !s.items.is_empty());
    for section in &mut sections {
        sort_by_position(&mut section.items);
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn category(id: i64, name: &str, position: i32) -> MenuCategory {
        MenuCategory {
            id,
            event_id: 1,
            name: name.to_string(),
            position,
        }
    }

    fn item(id: i64, category_id: Option<i64>, position: Option<i32>) -> MenuItem {
        MenuItem {
            id,
            event_id: 1,
            category_id,
            title: format!("dish {}", id),
            price: Decimal::ONE,
            terminated: false,
            position,
        }
    }

    fn layout(sections: &[MenuSection]) -> Vec<(String, Vec<i64>)> {
        sections
            .iter()
            .map(|s| (s.name.clone(), s.items.iter().map(|i| i.id).collect()))
            .collect()
    }

    #[test]
    fn test_sections_follow_category_position() {
        let categories = vec![category(10, "Dolci", 2), category(11, "Primi", 1)];
        let items = vec![item(1, Some(10), None), item(2, Some(11), None), item(3, Some(10), None)];

        let sections = group_by_category(&items, &categories);
        assert_eq!(
            layout(&sections),
            vec![
                ("Primi".to_string(), vec![2]),
                ("Dolci".to_string(), vec![1, 3]),
            ]
        );
        assert_eq!(sections[0].category_id, Some(11));
    }

    #[test]
    fn test_missing_and_deleted_categories_fall_back() {
        let categories = vec![category(10, "Primi", 1)];
        let items = vec![item(1, None, None), item(2, Some(99), None), item(3, Some(10), None)];

        let sections = group_by_category(&items, &categories);
        assert_eq!(
            layout(&sections),
            vec![
                ("Primi".to_string(), vec![3]),
                (UNCATEGORIZED.to_string(), vec![1, 2]),
            ]
        );
        assert_eq!(sections[1].category_id, None);
    }

    #[test]
    fn test_items_keep_order_unless_positioned() {
        let categories = vec![category(10, "Primi", 1)];
        let unranked = vec![item(3, Some(10), None), item(1, Some(10), None), item(2, Some(10), None)];
        assert_eq!(layout(&group_by_category(&unranked, &categories))[0].1, vec![3, 1, 2]);

        let ranked = vec![item(3, Some(10), Some(2)), item(1, Some(10), Some(3)), item(2, Some(10), Some(1))];
        assert_eq!(layout(&group_by_category(&ranked, &categories))[0].1, vec![2, 3, 1]);
    }

    #[test]
    fn test_same_name_categories_share_a_section() {
        let categories = vec![category(10, "Bevande", 1), category(11, "Bevande", 2)];
        let items = vec![item(1, Some(11), None), item(2, Some(10), None)];

        let sections = group_by_category(&items, &categories);
        assert_eq!(layout(&sections), vec![("Bevande".to_string(), vec![1, 2])]);
        assert_eq!(sections[0].category_id, Some(10));
    }

    #[test]
    fn test_category_named_uncategorized_absorbs_orphans() {
        let categories = vec![category(10, UNCATEGORIZED, 1), category(11, "Primi", 2)];
        let items = vec![item(1, None, None), item(2, Some(10), None), item(3, Some(11), None), item(4, Some(99), None)];

        let sections = group_by_category(&items, &categories);
        assert_eq!(
            layout(&sections),
            vec![
                (UNCATEGORIZED.to_string(), vec![2, 1, 4]),
                ("Primi".to_string(), vec![3]),
            ]
        );
        assert_eq!(sections[0].category_id, Some(10));
    }

    #[test]
    fn test_empty_menu_has_no_sections() {
        assert!(group_by_category(&[], &[category(1, "Primi", 1)]).is_empty());
    }
}
