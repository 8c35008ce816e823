//! Quota validation for prospective writes.
//!
//! Every check runs before anything is written, so a rejected batch
//! leaves no trace.

use std::fmt;

use crate::{Result, StashError};

use super::Storage;

const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Format a byte count using 1024-based units with two decimals.
pub fn format_bytes(bytes: i64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{value:.2} {}", UNITS[unit])
}

/// The storage limit a batch would breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaLimit {
    /// Maximum number of files in the storage.
    FilesCount,
    /// Maximum size of a single file.
    FileSize,
    /// Total capacity of the storage.
    Capacity,
}

/// A rejected batch together with the limit value it ran into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaViolation {
    /// Which limit was breached.
    pub limit: QuotaLimit,
    /// The configured limit value (files or bytes).
    pub value: i64,
}

impl QuotaViolation {
    /// Create a new violation.
    pub fn new(limit: QuotaLimit, value: i64) -> Self {
        Self { limit, value }
    }
}

impl fmt::Display for QuotaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit {
            QuotaLimit::FilesCount => write!(
                f,
                "the maximum number of files in the storage ({} files) would be exceeded",
                self.value
            ),
            QuotaLimit::FileSize => write!(
                f,
                "a file exceeds the maximum allowed size of {}",
                format_bytes(self.value)
            ),
            QuotaLimit::Capacity => write!(
                f,
                "the storage capacity of {} would be exceeded",
                format_bytes(self.value)
            ),
        }
    }
}

/// Evaluates a batch of writes against a storage's limits.
pub struct QuotaEnforcer;

impl QuotaEnforcer {
    /// Validate a batch of file sizes about to be written.
    ///
    /// `existing_count` is the number of files already in the storage.
    pub fn validate(storage: &Storage, existing_count: i64, batch: &[i64]) -> Result<()> {
        if storage.restrict_files_count
            && existing_count + batch.len() as i64 > storage.max_files_count
        {
            return Err(StashError::QuotaExceeded(QuotaViolation::new(
                QuotaLimit::FilesCount,
                storage.max_files_count,
            )));
        }

        if storage.restrict_file_size && batch.iter().any(|size| *size > storage.max_file_size) {
            return Err(StashError::QuotaExceeded(QuotaViolation::new(
                QuotaLimit::FileSize,
                storage.max_file_size,
            )));
        }

        let total: i64 = batch.iter().sum();
        if storage.used + total > storage.size {
            return Err(StashError::QuotaExceeded(QuotaViolation::new(
                QuotaLimit::Capacity,
                storage.size,
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageAccess;

    fn storage(size: i64, used: i64) -> Storage {
        Storage {
            id: "s1".to_string(),
            name: "test".to_string(),
            description: None,
            owner_id: "u1".to_string(),
            size,
            used,
            access: StorageAccess::Private,
            restrict_file_size: false,
            max_file_size: 0,
            restrict_files_count: false,
            max_files_count: 0,
            created_at: "2024-01-01 00:00:00".to_string(),
        }
    }

    fn limit_of(result: Result<()>) -> Option<QuotaLimit> {
        match result {
            Err(StashError::QuotaExceeded(v)) => Some(v.limit),
            _ => None,
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.00 MB");
    }

    #[test]
    fn test_within_limits() {
        let s = storage(1000, 100);
        assert!(QuotaEnforcer::validate(&s, 3, &[100, 200, 300]).is_ok());
        assert!(QuotaEnforcer::validate(&s, 0, &[]).is_ok());
    }

    #[test]
    fn test_capacity_exceeded() {
        let s = storage(1000, 900);
        let result = QuotaEnforcer::validate(&s, 0, &[150]);
        assert_eq!(limit_of(result), Some(QuotaLimit::Capacity));
    }

    #[test]
    fn test_capacity_exact_fit() {
        let s = storage(1000, 900);
        assert!(QuotaEnforcer::validate(&s, 0, &[100]).is_ok());
    }

    #[test]
    fn test_files_count_boundary() {
        let mut s = storage(1000, 0);
        s.restrict_files_count = true;
        s.max_files_count = 3;

        assert!(QuotaEnforcer::validate(&s, 2, &[1]).is_ok());
        let result = QuotaEnforcer::validate(&s, 2, &[1, 1]);
        assert_eq!(limit_of(result), Some(QuotaLimit::FilesCount));
    }

    #[test]
    fn test_file_size_exceeded() {
        let mut s = storage(1000, 0);
        s.restrict_file_size = true;
        s.max_file_size = 100;

        assert!(QuotaEnforcer::validate(&s, 0, &[100, 50]).is_ok());
        let result = QuotaEnforcer::validate(&s, 0, &[50, 101]);
        assert_eq!(limit_of(result), Some(QuotaLimit::FileSize));
    }

    #[test]
    fn test_unrestricted_limits_ignored() {
        let mut s = storage(1000, 0);
        s.max_file_size = 1;
        s.max_files_count = 0;
        assert!(QuotaEnforcer::validate(&s, 10, &[500]).is_ok());
    }

    #[test]
    fn test_count_checked_before_capacity() {
        let mut s = storage(10, 0);
        s.restrict_files_count = true;
        s.max_files_count = 0;
        let result = QuotaEnforcer::validate(&s, 0, &[100]);
        assert_eq!(limit_of(result), Some(QuotaLimit::FilesCount));
    }

    #[test]
    fn test_violation_message() {
        let v = QuotaViolation::new(QuotaLimit::FilesCount, 5);
        assert!(v.to_string().contains("5 files"));
        let v = QuotaViolation::new(QuotaLimit::FileSize, 2048);
        assert!(v.to_string().contains("2.00 KB"));
    }
}
