//! Fetches and parses the public per-broadcast contribution ranking page.
//!
//! The page is tolerant of malformed rows (blank cells, trailing rows with
//! fewer than three children) because the upstream markup has historically
//! varied release to release; any row that cannot be parsed is skipped
//! rather than aborting the whole fetch.

use scraper::{Html, Selector};

use crate::error::{Error, Result};
use crate::models::ScrapedListener;

const BASE_URL: &str = "https://www.showroom-live.com";
const RANKING_TABLE_CLASS: &str = "table-type-01";
const POINT_SUFFIX: &str = "pt";

/// Fetches a broadcast's ranking snapshot. Mirrors `Store`'s indirection:
/// `Scraper` is the only real implementation, but going through the trait
/// lets the dispatcher be driven against a canned fake in tests without
/// making network calls.
pub trait RankingSource: Send + Sync {
    async fn fetch(&self, event_id: &str, room_id: i64) -> Result<(i64, Vec<ScrapedListener>)>;
}

pub struct Scraper {
    client: reqwest::Client,
}

impl Scraper {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("rankwatch/1.0 (+contribution ranking archiver)")
            .build()
            .expect("failed to build reqwest client");

        Scraper { client }
    }

    /// Fetches the ranking page for one broadcast and returns its total
    /// point count alongside one row per listener, in scraped (descending
    /// rank) order.
    pub async fn fetch(&self, event_id: &str, room_id: i64) -> Result<(i64, Vec<ScrapedListener>)> {
        let url = format!("{BASE_URL}/event/contribution/{event_id}?room_id={room_id}");

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_ranking(&body)
    }
}

impl Default for Scraper {
    fn default() -> Self {
        Self::new()
    }
}

impl RankingSource for Scraper {
    async fn fetch(&self, event_id: &str, room_id: i64) -> Result<(i64, Vec<ScrapedListener>)> {
        Scraper::fetch(self, event_id, room_id).await
    }
}

fn parse_ranking(body: &str) -> Result<(i64, Vec<ScrapedListener>)> {
    let document = Html::parse_document(body);

    let table_selector =
        Selector::parse(&format!("table.{RANKING_TABLE_CLASS}")).map_err(|err| Error::Parse(err.to_string()))?;
    let row_selector = Selector::parse("tbody > tr").map_err(|err| Error::Parse(err.to_string()))?;
    let cell_selector = Selector::parse("td").map_err(|err| Error::Parse(err.to_string()))?;

    let ranking_table = document
        .select(&table_selector)
        .nth(1)
        .ok_or_else(|| Error::Parse(format!("expected at least two tables of class {RANKING_TABLE_CLASS}")))?;

    let mut rows = Vec::new();
    let mut total_points: i64 = 0;
    let mut order: i32 = 0;

    for row in ranking_table.select(&row_selector).skip(1) {
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if cells.len() < 3 {
            tracing::warn!(cell_count = cells.len(), "skipping ranking row: fewer than 3 cells");
            continue;
        }

        let rank_text = cells[0].text().collect::<String>();
        let listner = cells[1].text().collect::<String>().trim().to_string();
        let point_text = cells[2].text().collect::<String>();

        if listner.is_empty() {
            tracing::warn!("skipping ranking row: empty listener name");
            continue;
        }

        let Ok(rank) = rank_text.trim().parse::<i32>() else {
            tracing::warn!(rank_text = rank_text.trim(), listner, "skipping ranking row: unparsable rank");
            continue;
        };

        let Ok(point) = point_text
            .trim()
            .trim_end_matches(POINT_SUFFIX)
            .trim()
            .replace(',', "")
            .parse::<i64>()
        else {
            tracing::warn!(point_text = point_text.trim(), listner, "skipping ranking row: unparsable point total");
            continue;
        };

        order += 1;
        total_points += point;
        rows.push(ScrapedListener {
            listner,
            order,
            rank,
            point,
        });
    }

    Ok((total_points, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking_page(rows: &str) -> String {
        format!(
            r#"<html><body>
                <table class="table-type-01"><tbody><tr><td>unrelated</td></tr></tbody></table>
                <table class="table-type-01">
                    <tbody>
                        <tr><th>rank</th><th>name</th><th>point</th></tr>
                        {rows}
                    </tbody>
                </table>
            </body></html>"#
        )
    }

    #[test]
    fn parses_well_formed_rows_in_order() {
        let page = ranking_page(
            r#"
            <tr><td>1</td><td>Alice</td><td>1,500pt</td></tr>
            <tr><td>2</td><td>Bob</td><td>900pt</td></tr>
            "#,
        );

        let (total, rows) = parse_ranking(&page).unwrap();

        assert_eq!(total, 2400);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].listner, "Alice");
        assert_eq!(rows[0].point, 1500);
        assert_eq!(rows[0].order, 1);
        assert_eq!(rows[1].listner, "Bob");
        assert_eq!(rows[1].order, 2);
    }

    #[test]
    fn skips_malformed_rows_without_failing() {
        let page = ranking_page(
            r#"
            <tr><td>1</td><td>Alice</td><td>100pt</td></tr>
            <tr><td></td><td></td></tr>
            <tr><td>bad-rank</td><td>Eve</td><td>50pt</td></tr>
            <tr><td>3</td><td>Carol</td><td>40pt</td></tr>
            "#,
        );

        let (total, rows) = parse_ranking(&page).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(total, 140);
        assert_eq!(rows[1].listner, "Carol");
        assert_eq!(rows[1].order, 2);
    }

    #[test]
    fn missing_second_table_is_a_parse_error() {
        let page = "<html><body><table class=\"table-type-01\"><tbody></tbody></table></body></html>";
        let result = parse_ranking(page);
        assert!(matches!(result, Err(Error::Parse(_))));
    }
}
