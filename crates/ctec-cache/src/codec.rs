//! Cached values are stored as MessagePack.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CacheResult;

pub fn encode<T: Serialize + ?Sized>(value: &T) -> CacheResult<Vec<u8>> {
    Ok(rmp_serde::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CacheResult<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}
