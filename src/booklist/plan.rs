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


//! Query-plan builder for the booklist base query
//!
//! Each grouping dimension of a style contributes typed SQL fragments: a
//! key expression (text, drives group-change detection and node keys), a
//! label expression, and one or more sort expressions. The plan composes
//! them into a single ordered SELECT over the catalogue; the builder then
//! walks the result once and emits headers wherever a key changes.
//!
//! The plan knows which joins each dimension needs and only adds them when
//! a style asks for it, so a plain title list never pays for the shelf or
//! loan joins.

use crate::error::{Result, ShelfError};
use crate::style::{BookSort, GroupKind, Style};

use super::Filters;

// ===== STAGE FRAGMENTS =====

/// SQL fragments for one grouping level.
///
/// `key_expr` must always evaluate to TEXT and never NULL so that node
/// keys are well formed and group-change comparison is uniform.
#[derive(Debug, Clone)]
pub struct GroupStage {
    pub kind: GroupKind,
    pub key_expr: &'static str,
    pub label_expr: &'static str,
    pub sort_exprs: &'static [&'static str],
    /// Entity id carried onto the header row, if the dimension has one
    pub id_expr: Option<&'static str>,
}

fn stage_for(kind: GroupKind) -> GroupStage {
    match kind {
        GroupKind::Author => GroupStage {
            kind,
            key_expr: "CAST(COALESCE(a.author_id, 0) AS TEXT)",
            label_expr: "CASE WHEN a.author_id IS NULL THEN '(No Author)' \
                         WHEN a.given_names = '' THEN a.family_name \
                         ELSE a.family_name || ', ' || a.given_names END",
            sort_exprs: &[
                "COALESCE(a.family_name, '') COLLATE NOCASE",
                "COALESCE(a.given_names, '') COLLATE NOCASE",
            ],
            id_expr: Some("a.author_id"),
        },
        GroupKind::Series => GroupStage {
            kind,
            key_expr: "CAST(COALESCE(s.series_id, 0) AS TEXT)",
            label_expr: "COALESCE(s.name, '(No Series)')",
            sort_exprs: &["COALESCE(s.name, '') COLLATE NOCASE"],
            id_expr: Some("s.series_id"),
        },
        GroupKind::Bookshelf => GroupStage {
            kind,
            key_expr: "CAST(COALESCE(shelf.bookshelf_id, 0) AS TEXT)",
            label_expr: "COALESCE(shelf.name, '(Not on a shelf)')",
            sort_exprs: &["COALESCE(shelf.name, '') COLLATE NOCASE"],
            id_expr: Some("shelf.bookshelf_id"),
        },
        GroupKind::Loaned => GroupStage {
            kind,
            key_expr: "COALESCE(l.loaned_to, '')",
            label_expr: "COALESCE(l.loaned_to, 'Available')",
            sort_exprs: &["COALESCE(l.loaned_to, '') COLLATE NOCASE"],
            id_expr: None,
        },
        GroupKind::ReadStatus => GroupStage {
            kind,
            key_expr: "CAST(b.read AS TEXT)",
            label_expr: "CASE b.read WHEN 0 THEN 'Unread' ELSE 'Read' END",
            sort_exprs: &["b.read"],
            id_expr: None,
        },
        GroupKind::Rating => GroupStage {
            kind,
            key_expr: "CAST(CAST(COALESCE(b.rating, 0) AS INTEGER) AS TEXT)",
            label_expr: "CASE CAST(COALESCE(b.rating, 0) AS INTEGER) \
                         WHEN 0 THEN '(Unrated)' \
                         ELSE CAST(CAST(COALESCE(b.rating, 0) AS INTEGER) AS TEXT) END",
            sort_exprs: &["CAST(COALESCE(b.rating, 0) AS INTEGER) DESC"],
            id_expr: None,
        },
        GroupKind::Publisher => GroupStage {
            kind,
            key_expr: "COALESCE(b.publisher, '')",
            label_expr: "CASE WHEN COALESCE(b.publisher, '') = '' \
                         THEN '(No Publisher)' ELSE b.publisher END",
            sort_exprs: &["COALESCE(b.publisher, '') COLLATE NOCASE"],
            id_expr: None,
        },
        GroupKind::Language => GroupStage {
            kind,
            key_expr: "COALESCE(b.language, '')",
            label_expr: "CASE WHEN COALESCE(b.language, '') = '' \
                         THEN '(No Language)' ELSE b.language END",
            sort_exprs: &["COALESCE(b.language, '') COLLATE NOCASE"],
            id_expr: None,
        },
        GroupKind::Format => GroupStage {
            kind,
            key_expr: "COALESCE(b.format, '')",
            label_expr: "CASE WHEN COALESCE(b.format, '') = '' \
                         THEN '(No Format)' ELSE b.format END",
            sort_exprs: &["COALESCE(b.format, '') COLLATE NOCASE"],
            id_expr: None,
        },
        GroupKind::Genre => GroupStage {
            kind,
            key_expr: "COALESCE(b.genre, '')",
            label_expr: "CASE WHEN COALESCE(b.genre, '') = '' \
                         THEN '(No Genre)' ELSE b.genre END",
            sort_exprs: &["COALESCE(b.genre, '') COLLATE NOCASE"],
            id_expr: None,
        },
        GroupKind::TitleLetter => GroupStage {
            kind,
            key_expr: "UPPER(SUBSTR(b.sort_title, 1, 1))",
            label_expr: "UPPER(SUBSTR(b.sort_title, 1, 1))",
            sort_exprs: &["UPPER(SUBSTR(b.sort_title, 1, 1))"],
            id_expr: None,
        },
        GroupKind::PublicationYear => GroupStage {
            kind,
            key_expr: "COALESCE(STRFTIME('%Y', b.date_published), '')",
            label_expr: "COALESCE(STRFTIME('%Y', b.date_published), '(No Date)')",
            sort_exprs: &["COALESCE(STRFTIME('%Y', b.date_published), '') DESC"],
            id_expr: None,
        },
        GroupKind::PublicationMonth => GroupStage {
            kind,
            key_expr: "COALESCE(STRFTIME('%m', b.date_published), '')",
            label_expr: "COALESCE(STRFTIME('%m', b.date_published), '(No Date)')",
            sort_exprs: &["COALESCE(STRFTIME('%m', b.date_published), '')"],
            id_expr: None,
        },
        GroupKind::AddedYear => GroupStage {
            kind,
            key_expr: "COALESCE(STRFTIME('%Y', b.date_added), '')",
            label_expr: "COALESCE(STRFTIME('%Y', b.date_added), '(Unknown)')",
            sort_exprs: &["COALESCE(STRFTIME('%Y', b.date_added), '') DESC"],
            id_expr: None,
        },
        GroupKind::AddedMonth => GroupStage {
            kind,
            key_expr: "COALESCE(STRFTIME('%m', b.date_added), '')",
            label_expr: "COALESCE(STRFTIME('%m', b.date_added), '(Unknown)')",
            sort_exprs: &["COALESCE(STRFTIME('%m', b.date_added), '') DESC"],
            id_expr: None,
        },
        GroupKind::AddedDay => GroupStage {
            kind,
            key_expr: "COALESCE(STRFTIME('%d', b.date_added), '')",
            label_expr: "COALESCE(STRFTIME('%d', b.date_added), '(Unknown)')",
            sort_exprs: &["COALESCE(STRFTIME('%d', b.date_added), '') DESC"],
            id_expr: None,
        },
    }
}

// ===== PLAN =====

/// A fully composed base query for one build.
///
/// `sql` selects one row per (book x grouping context) in final tree
/// order with aliased per-level `gN_key` / `gN_label` / `gN_id` columns;
/// `binds` are the positional text parameters for the filters.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub stages: Vec<GroupStage>,
    pub sql: String,
    pub binds: Vec<String>,
}

impl QueryPlan {
    /// Compose the ordered base query for a style and filter set.
    ///
    /// Fails fast with a style-configuration error when the style's
    /// grouping dimensions cannot form a valid tree (duplicate
    /// dimensions would produce ambiguous node keys).
    pub fn compose(style: &Style, filters: &Filters) -> Result<QueryPlan> {
        let mut seen = Vec::new();
        for kind in &style.groups {
            if seen.contains(kind) {
                return Err(ShelfError::style_config(
                    format!("Style groups on '{}' more than once", kind.label()),
                    Some(style.uuid.to_string()),
                ));
            }
            seen.push(*kind);
        }

        let stages: Vec<GroupStage> = style.groups.iter().map(|k| stage_for(*k)).collect();

        let groups_on_shelf = style.groups.contains(&GroupKind::Bookshelf);

        let mut select = vec![
            "b.book_id AS book_id".to_string(),
            "b.title AS title".to_string(),
            "b.read AS read".to_string(),
            "CASE WHEN l.book_id IS NULL THEN 0 ELSE 1 END AS loaned".to_string(),
            "COALESCE(bs.series_num, '') AS series_num".to_string(),
            "a.author_id AS author_id".to_string(),
            "s.series_id AS series_id".to_string(),
        ];
        if groups_on_shelf {
            select.push("shelf.bookshelf_id AS bookshelf_id".to_string());
        } else {
            select.push("NULL AS bookshelf_id".to_string());
        }
        for (i, stage) in stages.iter().enumerate() {
            select.push(format!("{} AS g{}_key", stage.key_expr, i));
            select.push(format!("{} AS g{}_label", stage.label_expr, i));
            match stage.id_expr {
                Some(expr) => select.push(format!("{} AS g{}_id", expr, i)),
                None => select.push(format!("NULL AS g{}_id", i)),
            }
        }

        // Grouping on a multi-membership dimension fans the book out under
        // every author/series it belongs to; otherwise only the primary
        // link rides along for the row's display fields.
        let author_join = if style.groups.contains(&GroupKind::Author) {
            "LEFT JOIN book_authors ba ON ba.book_id = b.book_id"
        } else {
            "LEFT JOIN book_authors ba ON ba.book_id = b.book_id AND ba.position = 1"
        };
        let series_join = if style.groups.contains(&GroupKind::Series) {
            "LEFT JOIN book_series bs ON bs.book_id = b.book_id"
        } else {
            "LEFT JOIN book_series bs ON bs.book_id = b.book_id AND bs.position = 1"
        };
        let mut joins = vec![
            author_join,
            "LEFT JOIN authors a ON a.author_id = ba.author_id",
            series_join,
            "LEFT JOIN series s ON s.series_id = bs.series_id",
            // loan flag is carried on every book row
            "LEFT JOIN loans l ON l.book_id = b.book_id",
        ];
        if groups_on_shelf {
            joins.push("LEFT JOIN book_bookshelves bbs ON bbs.book_id = b.book_id");
            joins.push("LEFT JOIN bookshelves shelf ON shelf.bookshelf_id = bbs.bookshelf_id");
        }

        let mut wheres: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();
        if let Some(shelf_id) = filters.bookshelf_id {
            wheres.push(
                "EXISTS (SELECT 1 FROM book_bookshelves f \
                 WHERE f.book_id = b.book_id AND f.bookshelf_id = ?)"
                    .to_string(),
            );
            binds.push(shelf_id.to_string());
        }
        if let Some(search) = &filters.search {
            if !search.trim().is_empty() {
                wheres.push(
                    "b.book_id IN (SELECT docid FROM books_fts WHERE books_fts MATCH ?)"
                        .to_string(),
                );
                binds.push(search.trim().to_string());
            }
        }
        if let Some(read) = filters.read {
            wheres.push("b.read = ?".to_string());
            binds.push(if read { "1" } else { "0" }.to_string());
        }
        if let Some(loaned) = filters.loaned {
            if loaned {
                wheres.push("l.book_id IS NOT NULL".to_string());
            } else {
                wheres.push("l.book_id IS NULL".to_string());
            }
        }

        let mut order: Vec<String> = Vec::new();
        for (i, stage) in stages.iter().enumerate() {
            for sort in stage.sort_exprs {
                order.push((*sort).to_string());
            }
            // ties inside a sort expression still need a stable grouping
            order.push(format!("g{}_key", i));
        }
        match style.options.book_sort {
            BookSort::Title => order.push("b.sort_title COLLATE NOCASE".to_string()),
            BookSort::DateAdded => order.push("b.date_added DESC".to_string()),
        }
        order.push("b.book_id".to_string());

        let mut sql = format!("SELECT {} FROM books b", select.join(", "));
        for join in joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        Ok(QueryPlan {
            stages,
            sql,
            binds,
        })
    }

    pub fn level_count(&self) -> i64 {
        self.stages.len() as i64 + 1
    }
}
