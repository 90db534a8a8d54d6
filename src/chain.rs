//! Identifiers and externally-observed chain data.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A unique name assigned to one of the competing chains.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChainId(String);

impl ChainId {
    pub fn new<S: Into<String>>(name: S) -> Self {
        ChainId(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChainId {
    fn from(value: &str) -> Self {
        ChainId(value.to_owned())
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique name assigned to each mining pool in the roster.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PoolId(String);

impl PoolId {
    pub fn new<S: Into<String>>(name: S) -> Self {
        PoolId(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PoolId {
    fn from(value: &str) -> Self {
        PoolId(value.to_owned())
    }
}

impl Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle naming a deployed node. The orchestration layer maps each
/// handle to a live RPC endpoint; the engine only passes it through.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeHandle(String);

impl NodeHandle {
    pub fn new<S: Into<String>>(name: S) -> Self {
        NodeHandle(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeHandle {
    fn from(value: &str) -> Self {
        NodeHandle(value.to_owned())
    }
}

impl Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chain state polled from the running nodes once per block tick. Heights
/// are signed because they arrive from outside the engine and have not been
/// validated yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainObservation {
    /// Best height reported for the first chain.
    pub height_a: i64,
    /// Best height reported for the second chain.
    pub height_b: i64,
    /// Height of the recorded common ancestor of both branches.
    pub ancestor_height: i64,
    /// Transactions observed on the first chain since the last tick.
    pub tx_volume_a: f64,
    /// Transactions observed on the second chain since the last tick.
    pub tx_volume_b: f64,
}

/// Static per-run economic weight of one chain: how much custody and
/// transaction volume its ecosystem commands. Loaded once per run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// BTC held by custodians committed to this chain.
    pub custody_btc: f64,
    /// Daily transaction volume attributed to this chain.
    pub daily_tx_volume: f64,
}
