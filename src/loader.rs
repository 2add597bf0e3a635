//! Streams the grocery CSV export into `grocery_items`.
//!
//! One pass over the file: each row is parsed, rows without a title are
//! dropped, and the rest are appended to an in-memory batch that is handed
//! to the store whenever it reaches `chunk_size`. The store is committed once
//! after the last (possibly partial) batch, so a failure anywhere leaves the
//! run uncommitted.
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Instant;

use anyhow::{ensure, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info, instrument, warn};

use crate::database_ops::grocery_items::{GroceryStore, NewGroceryItem, MAX_BATCH_ROWS};
use crate::normalization::{parse_price, zero_price, RatingSummary};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

pub const TITLE_HEADER: &str = "Title";
pub const SUB_CATEGORY_HEADER: &str = "Sub Category";
/// The export pads this header with spaces on both sides.
pub const PRICE_HEADER: &str = " Price ";
pub const RATING_HEADER: &str = "Rating";

/// Column positions of the fields the loader reads, resolved once from the header row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderIndex {
    pub title: Option<usize>,
    pub sub_category: Option<usize>,
    pub price: Option<usize>,
    pub rating: Option<usize>,
}

impl HeaderIndex {
    /// Columns are matched by exact header text. The price column alone also
    /// accepts a header that only differs by surrounding whitespace, since
    /// re-saved exports tend to lose the padding. Missing columns read as
    /// absent on every row.
    pub fn resolve(headers: &StringRecord) -> Self {
        let exact = |name: &str| headers.iter().position(|h| h == name);
        let price = exact(PRICE_HEADER).or_else(|| {
            let found = headers.iter().position(|h| h.trim() == PRICE_HEADER.trim());
            if let Some(idx) = found {
                warn!(
                    header = ?&headers[idx],
                    "price column matched after trimming header whitespace"
                );
            }
            found
        });
        let index = Self {
            title: exact(TITLE_HEADER),
            sub_category: exact(SUB_CATEGORY_HEADER),
            price,
            rating: exact(RATING_HEADER),
        };
        for (name, pos) in [
            (TITLE_HEADER, index.title),
            (SUB_CATEGORY_HEADER, index.sub_category),
            (PRICE_HEADER, index.price),
            (RATING_HEADER, index.rating),
        ] {
            if pos.is_none() {
                warn!(column = ?name, "CSV column missing; reading as empty");
            }
        }
        index
    }

    fn field<'r>(pos: Option<usize>, record: &'r StringRecord) -> Option<&'r str> {
        pos.and_then(|i| record.get(i))
    }
}

/// Turn one CSV record into an insertable row, or `None` when the title is blank.
///
/// Unparsable prices fall back to `0.00`; rating value and review count are
/// both read from the same `Rating` text and may each be absent.
pub fn candidate_from_record(record: &StringRecord, index: &HeaderIndex) -> Option<NewGroceryItem> {
    let title = HeaderIndex::field(index.title, record).unwrap_or_default().trim();
    if title.is_empty() {
        return None;
    }
    let sub_category = HeaderIndex::field(index.sub_category, record)
        .unwrap_or_default()
        .trim();
    let price = parse_price(HeaderIndex::field(index.price, record)).unwrap_or_else(zero_price);
    let rating = RatingSummary::parse(HeaderIndex::field(index.rating, record));

    Some(NewGroceryItem {
        title: title.to_string(),
        sub_category: sub_category.to_string(),
        price,
        rating_value: rating.value,
        rating_count: rating.count,
    })
}

/// Load the CSV file at `path` into `store`. Returns the number of inserted rows.
///
/// The file handle lives only for the duration of the call.
#[instrument(skip(store, path), fields(path = %path.display()))]
pub async fn load_csv<S>(store: &mut S, path: &Path, chunk_size: usize) -> Result<u64>
where
    S: GroceryStore + ?Sized,
{
    let file =
        File::open(path).with_context(|| format!("failed to open CSV at {}", path.display()))?;
    load_from_reader(store, BufReader::with_capacity(1 << 20, file), chunk_size).await
}

/// Same as [`load_csv`] over any byte source carrying the CSV export.
pub async fn load_from_reader<S, R>(store: &mut S, reader: R, chunk_size: usize) -> Result<u64>
where
    S: GroceryStore + ?Sized,
    R: Read,
{
    ensure!(chunk_size > 0, "chunk size must be at least 1");
    ensure!(
        chunk_size <= MAX_BATCH_ROWS,
        "chunk size {chunk_size} exceeds the {MAX_BATCH_ROWS}-row limit of a single insert"
    );

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);
    let index = HeaderIndex::resolve(rdr.headers().context("failed to read CSV header row")?);

    let start = Instant::now();
    let mut record = StringRecord::new();
    let mut batch: Vec<NewGroceryItem> = Vec::with_capacity(chunk_size);
    let mut inserted = 0u64;
    let mut skipped = 0u64;
    let mut batches = 0u64;

    while rdr
        .read_record(&mut record)
        .context("failed to read CSV record")?
    {
        let Some(item) = candidate_from_record(&record, &index) else {
            skipped += 1;
            debug!(
                line = ?record.position().map(|p| p.line()),
                "skipping row without title"
            );
            continue;
        };
        batch.push(item);

        if batch.len() >= chunk_size {
            inserted += flush(store, &mut batch).await?;
            batches += 1;
            info!(
                target: "progress",
                batches,
                inserted,
                rate = ?format!("{:.1}/s", inserted as f64 / start.elapsed().as_secs_f64().max(0.001)),
                "batch flushed"
            );
        }
    }

    if !batch.is_empty() {
        inserted += flush(store, &mut batch).await?;
        batches += 1;
    }

    store.commit().await?;
    info!(
        target: "progress",
        inserted,
        skipped,
        batches,
        took = ?format!("{:.1}s", start.elapsed().as_secs_f64()),
        "done"
    );
    Ok(inserted)
}

async fn flush<S>(store: &mut S, batch: &mut Vec<NewGroceryItem>) -> Result<u64>
where
    S: GroceryStore + ?Sized,
{
    store.insert_batch(batch.as_slice()).await?;
    let flushed = batch.len() as u64;
    batch.clear();
    Ok(flushed)
}
