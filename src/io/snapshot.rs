//! Order snapshot file
//!
//! The snapshot is the durable order table of the binary: loaded before the
//! engine starts and rewritten when it stops. Saving goes through a sibling
//! temporary file and a rename so a crash mid-write leaves the previous
//! snapshot intact.

use crate::io::async_reader::read_orders;
use crate::io::csv_format::write_orders_csv;
use crate::types::{LedgerError, Order};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio_util::compat::TokioAsyncReadCompatExt;

/// Load every order from a snapshot file
///
/// # Returns
///
/// * `Ok(None)` - The file does not exist yet (first run)
/// * `Ok(Some(orders))` - The snapshot's orders
/// * `Err(_)` - The file exists but could not be read or parsed
pub async fn load_snapshot(path: &Path) -> Result<Option<Vec<Order>>, LedgerError> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LedgerError::IoError {
                message: format!("Failed to open snapshot '{}': {}", path.display(), e),
            })
        }
    };

    read_orders(file.compat()).await.map(Some)
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replace the snapshot file with `orders`
pub fn save_snapshot(path: &Path, orders: &[Order]) -> Result<(), LedgerError> {
    let staging = temporary_path(path);

    let file = std::fs::File::create(&staging)?;
    let mut writer = BufWriter::new(file);
    write_orders_csv(orders, &mut writer).map_err(|message| LedgerError::IoError { message })?;
    writer.flush()?;
    drop(writer);

    std::fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderStatus;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_snapshot_is_first_run() {
        let dir = TempDir::new().unwrap();

        let loaded = load_snapshot(&dir.path().join("orders.csv")).await.unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn test_save_then_load_restores_orders() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orders.csv");
        let uploaded = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let orders = vec![
            Order::new("A1", "u1", uploaded).advanced(
                OrderStatus::Processed,
                Decimal::new(72950, 2),
                uploaded + chrono::Duration::milliseconds(1500),
            ),
            Order::new("A2", "u2", uploaded + chrono::Duration::seconds(1)),
        ];

        save_snapshot(&path, &orders).unwrap();
        let loaded = load_snapshot(&path).await.unwrap().unwrap();

        assert_eq!(loaded, orders);
        assert!(!temporary_path(&path).exists());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orders.csv");
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        save_snapshot(&path, &[Order::new("A1", "u1", now)]).unwrap();
        save_snapshot(&path, &[]).unwrap();

        assert!(load_snapshot(&path).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orders.csv");
        std::fs::write(
            &path,
            "order,user,status,accrual,uploaded_at,updated_at\nA1,u1,NEW,,not-a-time,x\n",
        )
        .unwrap();

        let result = load_snapshot(&path).await;
        assert!(matches!(result, Err(LedgerError::ParseError { line: Some(2), .. })));
    }
}
