use snowflake::SnowflakeIdGenerator;
use std::sync::Mutex;
use std::time::{Duration, UNIX_EPOCH};

// 2024-01-01T00:00:00Z
const SNOWFLAKE_EPOCH: u64 = 1704067200000;

static GENERATOR: once_cell::sync::OnceCell<Mutex<SnowflakeIdGenerator>> = once_cell::sync::OnceCell::new();

fn new() -> Mutex<SnowflakeIdGenerator> {
    let epoch = UNIX_EPOCH + Duration::from_millis(SNOWFLAKE_EPOCH);
    let machine_id = fastrand::i32(0..32);
    let node_id = fastrand::i32(0..32);
    Mutex::new(SnowflakeIdGenerator::with_epoch(machine_id, node_id, epoch))
}

/// Next row id for wallets, transactions, holdings, activities and requests.
pub fn next() -> i64 {
    let mut generator = GENERATOR.get_or_init(new).lock().unwrap_or_else(|e| e.into_inner());
    generator.generate()
}

/// Payment reference in the `<PREFIX>-<id>` form handed to the payment provider.
pub fn next_reference(prefix: &str) -> String {
    format!("{prefix}-{}", next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_next() {
        let mut seen = HashSet::new();
        for idx in 0..10000 {
            let id = next();
            assert!(id > 0, "id: {}, idx: {}", id, idx);
            assert!(seen.insert(id), "duplicate id {} at {}", id, idx);
        }
    }

    #[test]
    fn test_next_reference() {
        let reference = next_reference("CONT");
        let (prefix, id) = reference.split_once('-').unwrap();
        assert_eq!(prefix, "CONT");
        assert!(id.parse::<i64>().unwrap() > 0);
    }
}
