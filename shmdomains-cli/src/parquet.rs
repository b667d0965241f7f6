//! Arrow schema and Parquet I/O for the sale archive.
//!
//! Sales are converted straight into columnar [`RecordBatch`]es; amounts are
//! stored as decimal wei strings because they do not fit any Arrow integer.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use arrow_array::{RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use shmdomains::SaleRecord;

/// Arrow schema of one archived sale.
static SALE_SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("block_number", DataType::UInt64, false),
        Field::new("timestamp", DataType::UInt64, false),
        Field::new("tx_hash", DataType::Utf8, false),
        Field::new("domain", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("price_wei", DataType::Utf8, false),
        Field::new("seller", DataType::Utf8, false),
        Field::new("buyer", DataType::Utf8, false),
    ]))
});

/// Convert sales into a columnar [`RecordBatch`].
///
/// # Errors
///
/// Returns an error if the Arrow `RecordBatch` construction fails.
pub fn sales_to_batch(sales: &[SaleRecord]) -> Result<RecordBatch> {
    let batch = RecordBatch::try_new(
        Arc::clone(&SALE_SCHEMA),
        vec![
            Arc::new(UInt64Array::from_iter_values(sales.iter().map(|s| s.block_number))),
            Arc::new(UInt64Array::from_iter_values(sales.iter().map(|s| s.timestamp))),
            Arc::new(StringArray::from_iter_values(
                sales.iter().map(|s| format!("{:#x}", s.tx_hash)),
            )),
            Arc::new(StringArray::from_iter_values(sales.iter().map(|s| s.domain.as_str()))),
            Arc::new(StringArray::from_iter_values(sales.iter().map(|s| s.kind.as_str()))),
            Arc::new(StringArray::from_iter_values(sales.iter().map(|s| s.price.to_string()))),
            Arc::new(StringArray::from_iter_values(
                sales.iter().map(|s| format!("{:#x}", s.seller)),
            )),
            Arc::new(StringArray::from_iter_values(
                sales.iter().map(|s| format!("{:#x}", s.buyer)),
            )),
        ],
    )?;
    Ok(batch)
}

/// Highest `block_number` across all batches.
///
/// The archive's own progress, independent of the cursor, so a run that
/// wrote sales but crashed before saving the cursor does not duplicate rows.
#[must_use]
pub fn max_block_number(batches: &[RecordBatch]) -> Option<u64> {
    batches
        .iter()
        .filter_map(|batch| {
            let col = batch
                .column_by_name("block_number")?
                .as_any()
                .downcast_ref::<UInt64Array>()?;
            col.values().iter().copied().max()
        })
        .max()
}

/// Read every record batch of an archive.
///
/// A missing file is an empty archive.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
    };
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|builder| builder.build())
        .with_context(|| format!("opening sale archive {}", path.display()))?;
    reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("decoding sale archive {}", path.display()))
}

/// Zstd level 3.
fn writer_properties() -> Result<WriterProperties> {
    let level = ZstdLevel::try_new(3).context("invalid zstd level")?;
    Ok(WriterProperties::builder()
        .set_compression(Compression::ZSTD(level))
        .build())
}

/// Replace the archive at `path` with `batches`.
///
/// The batches go to `<path>.tmp` first, which is then renamed over `path`,
/// so readers see either the old or the new archive.
///
/// # Errors
///
/// Returns an error on I/O failure or if the Parquet writer rejects the data.
pub fn write(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let tmp = path.with_extension("parquet.tmp");
    let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let mut writer = ArrowWriter::try_new(file, Arc::clone(&SALE_SCHEMA), Some(writer_properties()?))?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;

    std::fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, TxHash, U256};
    use shmdomains::SaleKind;

    use super::*;

    fn sale(block_number: u64, kind: SaleKind) -> SaleRecord {
        SaleRecord {
            domain: "alice".into(),
            price: U256::from(5_000_000_000_000_000_000u64),
            seller: Address::repeat_byte(1),
            buyer: Address::repeat_byte(2),
            timestamp: block_number * 10,
            kind,
            tx_hash: TxHash::repeat_byte(3),
            block_number,
        }
    }

    #[test]
    fn archive_round_trip() {
        let dir = std::env::temp_dir().join(format!("shmdomains-parquet-{}", std::process::id()));
        let path = dir.join("sales.parquet");

        let first = sales_to_batch(&[sale(10, SaleKind::Sale), sale(30, SaleKind::Offer)]).unwrap();
        let second = sales_to_batch(&[sale(20, SaleKind::Auction)]).unwrap();
        write(&path, &[first, second]).unwrap();

        let batches = read(&path).unwrap();
        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 3, "all rows persisted");
        assert_eq!(max_block_number(&batches), Some(30), "archive progress");

        let prices = batches
            .first()
            .and_then(|b| b.column_by_name("price_wei"))
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .map(|c| c.value(0).to_owned());
        assert_eq!(prices.as_deref(), Some("5000000000000000000"), "decimal wei");
        assert!(!path.with_extension("parquet.tmp").exists(), "temporary file renamed away");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_archive_is_empty() {
        let batches = read(Path::new("/nonexistent/sales.parquet")).unwrap();
        assert!(batches.is_empty(), "no batches");
        assert_eq!(max_block_number(&batches), None, "no progress");
    }
}
