//! Collision-resistant names for compressed files and stored objects.

use crate::models::upload::ImageFile;
use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric, rng};

const TOKEN_LEN: usize = 6;

/// Short lowercase alphanumeric token.
pub fn random_token(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// `{millis}_{token}_{stem20}.jpg`, the name a compressed file is given.
pub fn compressed_file_name(original: &ImageFile, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.jpg",
        now.timestamp_millis(),
        random_token(TOKEN_LEN),
        original.sanitized_stem(20)
    )
}

/// `{millis}_{token}_{token}_{stem15}.jpg`, the object-store name of an
/// upload. Uses two tokens so it never equals the compression-stage name.
pub fn object_name(original: &ImageFile, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}_{}.jpg",
        now.timestamp_millis(),
        random_token(TOKEN_LEN),
        random_token(TOKEN_LEN),
        original.sanitized_stem(15)
    )
}
