// OpenShelf - Personal Library Catalogue for Mobile
// Copyright (C) 2026 OpenShelf contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! End-to-end behavior of the booklist engine: build shape, collapse
//! arithmetic, persistence, and rebuild orchestration.

use sqlx::SqlitePool;

use openshelf_core::booklist::{BooklistBuilder, Filters, RowKind};
use openshelf_core::shelf::{BookshelfController, RebuildKind, ScrollAnchor};
use openshelf_core::storage::models::{NewAuthor, NewBook};
use openshelf_core::storage::{queries, Database};
use openshelf_core::style::{GroupKind, Style};

/// Two authors, three books: Doe {Alpha, Beta}, Roe {Gamma}
async fn two_author_library() -> SqlitePool {
    let db = Database::new_in_memory()
        .await
        .expect("Failed to create test database");
    let pool = db.pool().clone();

    let doe = queries::upsert_author(&pool, &NewAuthor::parse("Jane Doe"))
        .await
        .expect("Failed to insert author");
    let roe = queries::upsert_author(&pool, &NewAuthor::parse("Richard Roe"))
        .await
        .expect("Failed to insert author");
    for (title, author) in [("Alpha", doe), ("Beta", doe), ("Gamma", roe)] {
        let book = queries::insert_book(&pool, &NewBook::new(title.to_string()))
            .await
            .expect("Failed to insert book");
        queries::add_book_author(&pool, book, author, 1)
            .await
            .expect("Failed to link author");
    }
    pool
}

/// The same library with a series threaded through Doe's books
async fn series_library() -> SqlitePool {
    let pool = two_author_library().await;
    let series = queries::upsert_series(&pool, "Chronicles")
        .await
        .expect("Failed to insert series");
    queries::add_book_to_series(&pool, 1, series, "1", 1)
        .await
        .expect("Failed to link series");
    queries::add_book_to_series(&pool, 2, series, "2", 1)
        .await
        .expect("Failed to link series");
    pool
}

fn author_style() -> Style {
    Style::new("By Author", vec![GroupKind::Author])
}

async fn visible_labels(list: &BooklistBuilder) -> Vec<String> {
    let cursor = list.cursor();
    let count = cursor.visible_count().await.expect("count failed");
    let rows = cursor.window(0, count).await.expect("window failed");
    rows.into_iter().map(|r| r.label).collect()
}

/// Assert the flattened table is a well-formed pre-order walk: absolute
/// positions dense from 0, the root level first, descents one level at a
/// time, no empty headers, and books only at the deepest level. Together
/// these pin every subtree to the contiguous run ending at the next row
/// with level <= its own.
async fn assert_preorder_shape(list: &BooklistBuilder) {
    let cursor = list.cursor();
    let total = cursor.total_count().await.expect("count failed");
    assert!(total > 0, "empty table");

    let mut rows = Vec::new();
    for pos in 0..total {
        let row = cursor
            .row_at_absolute(pos)
            .await
            .expect("gap in absolute positions");
        assert_eq!(row.abs_pos, pos);
        rows.push(row);
    }

    let book_level = cursor.level_count();
    assert_eq!(rows[0].level, 1, "walk must start at the root level");
    for pair in rows.windows(2) {
        assert!(
            pair[1].level <= pair[0].level + 1,
            "level skipped between {} and {}",
            pair[0].abs_pos,
            pair[1].abs_pos
        );
        if !pair[0].is_book() {
            assert_eq!(
                pair[1].level,
                pair[0].level + 1,
                "header at {} has an empty subtree",
                pair[0].abs_pos
            );
        }
    }
    for row in &rows {
        assert_eq!(row.is_book(), row.level == book_level, "row {}", row.abs_pos);
    }
    assert!(
        rows.last().is_some_and(|r| r.is_book()),
        "walk must end on a book row"
    );
}

#[tokio::test]
async fn test_author_grouping_produces_expected_sequence() {
    let pool = two_author_library().await;
    let mut list = BooklistBuilder::build(pool, &author_style(), &Filters::default())
        .await
        .expect("Failed to build booklist");

    let cursor = list.cursor();
    let rows = cursor.window(0, 10).await.expect("window failed");
    let shape: Vec<(i64, i64, String)> = rows
        .iter()
        .map(|r| (r.abs_pos, r.level, r.label.clone()))
        .collect();
    assert_eq!(
        shape,
        vec![
            (0, 1, "Doe, Jane".to_string()),
            (1, 2, "Alpha".to_string()),
            (2, 2, "Beta".to_string()),
            (3, 1, "Roe, Richard".to_string()),
            (4, 2, "Gamma".to_string()),
        ]
    );
    assert_eq!(
        rows[0].row_kind().expect("bad kind"),
        RowKind::Author
    );
    assert!(rows[1].is_book());
    assert_preorder_shape(&list).await;

    list.close().await.expect("Failed to close booklist");
}

#[tokio::test]
async fn test_preorder_shape_holds_across_styles_and_toggles() {
    let pool = series_library().await;

    // ungrouped flat list: every row is a book at the root level
    let mut flat = BooklistBuilder::build(pool.clone(), &Style::new("Flat", vec![]), &Filters::default())
        .await
        .expect("Failed to build booklist");
    assert_preorder_shape(&flat).await;
    flat.close().await.expect("Failed to close booklist");

    // two grouping levels, checked again after collapsing a header:
    // visibility changes, the underlying walk does not
    let style = Style::new("Authors and Series", vec![GroupKind::Author, GroupKind::Series]);
    let mut list = BooklistBuilder::build(pool, &style, &Filters::default())
        .await
        .expect("Failed to build booklist");
    assert_preorder_shape(&list).await;

    list.toggle_node(0).await.expect("Failed to toggle");
    assert_preorder_shape(&list).await;

    list.close().await.expect("Failed to close booklist");
}

#[tokio::test]
async fn test_rebuild_is_deterministic() {
    let pool = two_author_library().await;
    let style = author_style();

    let mut first = BooklistBuilder::build(pool.clone(), &style, &Filters::default())
        .await
        .expect("Failed to build booklist");
    let labels_a = visible_labels(&first).await;
    first.close().await.expect("Failed to close booklist");

    let mut second = BooklistBuilder::build(pool, &style, &Filters::default())
        .await
        .expect("Failed to build booklist");
    let labels_b = visible_labels(&second).await;
    second.close().await.expect("Failed to close booklist");

    assert_eq!(labels_a, labels_b);
}

#[tokio::test]
async fn test_collapse_hides_range_but_keeps_absolute_positions() {
    let pool = two_author_library().await;
    let mut list = BooklistBuilder::build(pool, &author_style(), &Filters::default())
        .await
        .expect("Failed to build booklist");

    list.toggle_node(0).await.expect("Failed to toggle");

    // Roe's header slides up to visible position 1 but keeps abs 3
    let cursor = list.cursor();
    let row = cursor
        .row_at(1)
        .await
        .expect("Failed to read row")
        .expect("Row missing");
    assert_eq!(row.abs_pos, 3);
    assert_eq!(row.label, "Roe, Richard");
    assert_eq!(
        cursor
            .visible_position_of(3)
            .await
            .expect("Failed to project"),
        Some(1)
    );

    // hidden rows stay addressable by absolute position
    let hidden = cursor
        .row_at_absolute(1)
        .await
        .expect("Failed to read hidden row");
    assert_eq!(hidden.label, "Alpha");
    assert!(!hidden.visible);

    list.close().await.expect("Failed to close booklist");
}

#[tokio::test]
async fn test_toggle_twice_restores_identical_projection() {
    let pool = two_author_library().await;
    let mut list = BooklistBuilder::build(pool, &author_style(), &Filters::default())
        .await
        .expect("Failed to build booklist");

    let before = visible_labels(&list).await;
    list.toggle_node(0).await.expect("Failed to toggle");
    list.toggle_node(0).await.expect("Failed to toggle");
    let after = visible_labels(&list).await;
    assert_eq!(before, after);

    list.close().await.expect("Failed to close booklist");
}

#[tokio::test]
async fn test_nested_collapse_survives_outer_toggle() {
    let pool = series_library().await;
    let style = Style::new("Authors and Series", vec![GroupKind::Author, GroupKind::Series]);
    let mut list = BooklistBuilder::build(pool, &style, &Filters::default())
        .await
        .expect("Failed to build booklist");

    // Doe > Chronicles > {Alpha, Beta}; find the series header
    let cursor = list.cursor();
    let count = cursor.visible_count().await.expect("count failed");
    let rows = cursor.window(0, count).await.expect("window failed");
    let series_pos = rows
        .iter()
        .find(|r| r.label == "Chronicles")
        .expect("Series header missing")
        .abs_pos;
    let author_pos = rows
        .iter()
        .find(|r| r.label == "Doe, Jane")
        .expect("Author header missing")
        .abs_pos;

    // collapse the inner series, then the author, then expand the author:
    // the series must still be collapsed
    list.toggle_node(series_pos).await.expect("Failed to toggle");
    list.toggle_node(author_pos).await.expect("Failed to toggle");
    list.toggle_node(author_pos).await.expect("Failed to toggle");

    let labels = visible_labels(&list).await;
    assert!(labels.contains(&"Chronicles".to_string()));
    assert!(!labels.contains(&"Alpha".to_string()));
    assert!(!labels.contains(&"Beta".to_string()));

    list.close().await.expect("Failed to close booklist");
}

#[tokio::test]
async fn test_expanding_hidden_node_reveals_nothing() {
    let pool = series_library().await;
    let style = Style::new("Authors and Series", vec![GroupKind::Author, GroupKind::Series]);
    let mut list = BooklistBuilder::build(pool, &style, &Filters::default())
        .await
        .expect("Failed to build booklist");

    let cursor = list.cursor();
    let count = cursor.visible_count().await.expect("count failed");
    let rows = cursor.window(0, count).await.expect("window failed");
    let series_pos = rows
        .iter()
        .find(|r| r.label == "Chronicles")
        .expect("Series header missing")
        .abs_pos;
    let author_pos = rows
        .iter()
        .find(|r| r.label == "Doe, Jane")
        .expect("Author header missing")
        .abs_pos;

    // collapse the series, collapse its author, then toggle the now-hidden
    // series back open by absolute position
    list.toggle_node(series_pos).await.expect("Failed to toggle");
    list.toggle_node(author_pos).await.expect("Failed to toggle");
    let expanded = list.toggle_node(series_pos).await.expect("Failed to toggle");
    assert!(expanded);

    // nothing under the still-collapsed author may surface
    let labels = visible_labels(&list).await;
    assert!(!labels.contains(&"Chronicles".to_string()));
    assert!(!labels.contains(&"Alpha".to_string()));
    assert!(!labels.contains(&"Beta".to_string()));

    // reopening the author honours the series' recorded expanded state
    list.toggle_node(author_pos).await.expect("Failed to toggle");
    let labels = visible_labels(&list).await;
    assert!(labels.contains(&"Chronicles".to_string()));
    assert!(labels.contains(&"Alpha".to_string()));

    list.close().await.expect("Failed to close booklist");
}

#[tokio::test]
async fn test_coauthored_book_appears_under_each_author() {
    let pool = two_author_library().await;
    // Gamma gains Doe as a second author
    queries::add_book_author(&pool, 3, 1, 2)
        .await
        .expect("Failed to link co-author");

    let mut list = BooklistBuilder::build(pool, &author_style(), &Filters::default())
        .await
        .expect("Failed to build booklist");

    let labels = visible_labels(&list).await;
    assert_eq!(
        labels,
        vec![
            "Doe, Jane".to_string(),
            "Alpha".to_string(),
            "Beta".to_string(),
            "Gamma".to_string(),
            "Roe, Richard".to_string(),
            "Gamma".to_string(),
        ]
    );
    // both placements are reachable by book id
    let placements = list.rows_for_book(3).await.expect("Failed to look up book");
    assert_eq!(placements.len(), 2);
    assert_preorder_shape(&list).await;

    list.close().await.expect("Failed to close booklist");
}

#[tokio::test]
async fn test_series_numbers_ride_on_book_rows() {
    let pool = series_library().await;
    let style = Style::new("Series", vec![GroupKind::Series]);
    let mut list = BooklistBuilder::build(pool, &style, &Filters::default())
        .await
        .expect("Failed to build booklist");

    let cursor = list.cursor();
    let count = cursor.visible_count().await.expect("count failed");
    let rows = cursor.window(0, count).await.expect("window failed");
    let alpha = rows
        .iter()
        .find(|r| r.label == "Alpha")
        .expect("Book row missing");
    assert_eq!(alpha.series_num, "1");

    list.close().await.expect("Failed to close booklist");
}

#[tokio::test]
async fn test_collapse_state_scoped_to_filter() {
    let pool = two_author_library().await;
    let style = author_style();

    // collapse Doe in the all-books scope
    let mut all_books = BooklistBuilder::build(pool.clone(), &style, &Filters::default())
        .await
        .expect("Failed to build booklist");
    all_books.toggle_node(0).await.expect("Failed to toggle");
    all_books.close().await.expect("Failed to close booklist");

    // a shelf-filtered list of the same style has its own scope
    queries::add_book_to_shelf(&pool, 1, 1)
        .await
        .expect("Failed to shelve book");
    let mut shelf_list =
        BooklistBuilder::build(pool.clone(), &style, &Filters::for_bookshelf(1))
            .await
            .expect("Failed to build booklist");
    let labels = visible_labels(&shelf_list).await;
    assert!(labels.contains(&"Alpha".to_string()));
    shelf_list.close().await.expect("Failed to close booklist");

    // while the all-books scope still reopens collapsed
    let mut reopened = BooklistBuilder::build(pool, &style, &Filters::default())
        .await
        .expect("Failed to build booklist");
    assert_eq!(reopened.summary().visible_count, 3);
    reopened.close().await.expect("Failed to close booklist");
}

#[tokio::test]
async fn test_search_filter_narrows_tree() {
    let pool = two_author_library().await;
    let filters = Filters {
        search: Some("Gamma".to_string()),
        ..Default::default()
    };
    let mut list = BooklistBuilder::build(pool, &author_style(), &filters)
        .await
        .expect("Failed to build booklist");

    let labels = visible_labels(&list).await;
    assert_eq!(labels, vec!["Roe, Richard".to_string(), "Gamma".to_string()]);
    assert_preorder_shape(&list).await;

    list.close().await.expect("Failed to close booklist");
}

#[tokio::test]
async fn test_partial_rebuild_keeps_target_book_near_anchor() {
    let pool = two_author_library().await;
    let controller = BookshelfController::new(pool.clone(), author_style());
    controller
        .rebuild(RebuildKind::Full)
        .await
        .expect("Failed to rebuild");

    // the user edits Gamma (book 3), new books land above it
    for title in ["Delta", "Epsilon"] {
        let book = queries::insert_book(&pool, &NewBook::new(title.to_string()))
            .await
            .expect("Failed to insert book");
        queries::add_book_author(&pool, book, 1, 1)
            .await
            .expect("Failed to link author");
    }
    controller
        .save_scroll(ScrollAnchor {
            first_visible_pos: 4,
            pixel_offset: 12,
        })
        .await;
    controller.set_target_book(Some(3)).await;

    let outcome = controller
        .rebuild(RebuildKind::Partial)
        .await
        .expect("Failed to rebuild")
        .expect("Build was superseded");

    // Doe now holds 4 books; Gamma sits at visible position 6
    let cursor = controller.cursor().await.expect("Failed to get cursor");
    let row = cursor
        .row_at(outcome.position)
        .await
        .expect("Failed to read row")
        .expect("Row missing");
    assert_eq!(row.book_id, Some(3));
    assert_eq!(row.label, "Gamma");

    controller.close().await.expect("Failed to close controller");
}

#[tokio::test]
async fn test_concurrent_rebuilds_install_only_latest() {
    let pool = two_author_library().await;
    let controller = BookshelfController::new(pool.clone(), author_style());

    let (first, second) = tokio::join!(
        controller.rebuild(RebuildKind::Full),
        controller.rebuild(RebuildKind::Full),
    );
    assert!(first.expect("Failed to rebuild").is_none());
    let outcome = second
        .expect("Failed to rebuild")
        .expect("Latest build must install");
    assert_eq!(outcome.summary.visible_count, 5);

    // the cursor reads the installed build
    let cursor = controller.cursor().await.expect("Failed to get cursor");
    assert_eq!(cursor.visible_count().await.expect("count failed"), 5);

    controller.close().await.expect("Failed to close controller");

    // close sweeps every materialized table
    let leftovers: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE name LIKE 'booklist_tmp_%'",
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to list tables");
    assert!(leftovers.is_empty());
}
