//! Closed sets of metric and error codes, one enum per chain family.
//!
//! A [`MetricCode`] is the key for every per-metric map in the alerting
//! state. Each code also knows which classifier evaluates it, so the
//! driver never needs a per-chain lookup table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Upstream error code reported alongside a monitoring round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub u32);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which classification algorithm evaluates a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierKind {
    Threshold,
    ReverseThreshold,
    OccurrenceThreshold,
    EraThreshold,
    NoChange,
    Downtime,
    Conditional,
    SolvableConditional,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemMetric {
    OpenFileDescriptors,
    CpuUsage,
    RamUsage,
    StorageUsage,
    SystemIsDown,
    InvalidUrl,
    MetricNotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CosmosMetric {
    NoChangeInBlockHeight,
    BlockHeightDifference,
    MissedBlocks,
    ValidatorIsJailed,
    ValidatorWasSlashed,
    NodeIsDown,
    NewProposalSubmitted,
    SourceUnreachable,
    DataNotObtained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubstrateMetric {
    NoChangeInBestBlockHeight,
    NoChangeInFinalizedBlockHeight,
    ValidatorIsDown,
    PayoutNotClaimed,
    NoHeartbeatAndBlockAuthored,
    ValidatorNotActive,
    NewReferendum,
    WebsocketUnreachable,
    DataNotObtained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainlinkMetric {
    NoChangeInHeight,
    EthBalanceAmount,
    MaxUnconfirmedBlocks,
    ErroredJobRuns,
    NodeIsDown,
    PrometheusSourceUnreachable,
    MetricNotFound,
}

/// Metric identifier tagged by chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricCode {
    System(SystemMetric),
    Cosmos(CosmosMetric),
    Substrate(SubstrateMetric),
    Chainlink(ChainlinkMetric),
}

const ALL: &[MetricCode] = &[
    MetricCode::System(SystemMetric::OpenFileDescriptors),
    MetricCode::System(SystemMetric::CpuUsage),
    MetricCode::System(SystemMetric::RamUsage),
    MetricCode::System(SystemMetric::StorageUsage),
    MetricCode::System(SystemMetric::SystemIsDown),
    MetricCode::System(SystemMetric::InvalidUrl),
    MetricCode::System(SystemMetric::MetricNotFound),
    MetricCode::Cosmos(CosmosMetric::NoChangeInBlockHeight),
    MetricCode::Cosmos(CosmosMetric::BlockHeightDifference),
    MetricCode::Cosmos(CosmosMetric::MissedBlocks),
    MetricCode::Cosmos(CosmosMetric::ValidatorIsJailed),
    MetricCode::Cosmos(CosmosMetric::ValidatorWasSlashed),
    MetricCode::Cosmos(CosmosMetric::NodeIsDown),
    MetricCode::Cosmos(CosmosMetric::NewProposalSubmitted),
    MetricCode::Cosmos(CosmosMetric::SourceUnreachable),
    MetricCode::Cosmos(CosmosMetric::DataNotObtained),
    MetricCode::Substrate(SubstrateMetric::NoChangeInBestBlockHeight),
    MetricCode::Substrate(SubstrateMetric::NoChangeInFinalizedBlockHeight),
    MetricCode::Substrate(SubstrateMetric::ValidatorIsDown),
    MetricCode::Substrate(SubstrateMetric::PayoutNotClaimed),
    MetricCode::Substrate(SubstrateMetric::NoHeartbeatAndBlockAuthored),
    MetricCode::Substrate(SubstrateMetric::ValidatorNotActive),
    MetricCode::Substrate(SubstrateMetric::NewReferendum),
    MetricCode::Substrate(SubstrateMetric::WebsocketUnreachable),
    MetricCode::Substrate(SubstrateMetric::DataNotObtained),
    MetricCode::Chainlink(ChainlinkMetric::NoChangeInHeight),
    MetricCode::Chainlink(ChainlinkMetric::EthBalanceAmount),
    MetricCode::Chainlink(ChainlinkMetric::MaxUnconfirmedBlocks),
    MetricCode::Chainlink(ChainlinkMetric::ErroredJobRuns),
    MetricCode::Chainlink(ChainlinkMetric::NodeIsDown),
    MetricCode::Chainlink(ChainlinkMetric::PrometheusSourceUnreachable),
    MetricCode::Chainlink(ChainlinkMetric::MetricNotFound),
];

impl MetricCode {
    pub fn all() -> &'static [MetricCode] {
        ALL
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCode::System(m) => match m {
                SystemMetric::OpenFileDescriptors => "system_open_file_descriptors",
                SystemMetric::CpuUsage => "system_cpu_usage",
                SystemMetric::RamUsage => "system_ram_usage",
                SystemMetric::StorageUsage => "system_storage_usage",
                SystemMetric::SystemIsDown => "system_is_down",
                SystemMetric::InvalidUrl => "system_invalid_url",
                SystemMetric::MetricNotFound => "system_metric_not_found",
            },
            MetricCode::Cosmos(m) => match m {
                CosmosMetric::NoChangeInBlockHeight => "cosmos_no_change_in_block_height",
                CosmosMetric::BlockHeightDifference => "cosmos_block_height_difference",
                CosmosMetric::MissedBlocks => "cosmos_missed_blocks",
                CosmosMetric::ValidatorIsJailed => "cosmos_validator_is_jailed",
                CosmosMetric::ValidatorWasSlashed => "cosmos_validator_was_slashed",
                CosmosMetric::NodeIsDown => "cosmos_node_is_down",
                CosmosMetric::NewProposalSubmitted => "cosmos_new_proposal_submitted",
                CosmosMetric::SourceUnreachable => "cosmos_source_unreachable",
                CosmosMetric::DataNotObtained => "cosmos_data_not_obtained",
            },
            MetricCode::Substrate(m) => match m {
                SubstrateMetric::NoChangeInBestBlockHeight => {
                    "substrate_no_change_in_best_block_height"
                }
                SubstrateMetric::NoChangeInFinalizedBlockHeight => {
                    "substrate_no_change_in_finalized_block_height"
                }
                SubstrateMetric::ValidatorIsDown => "substrate_validator_is_down",
                SubstrateMetric::PayoutNotClaimed => "substrate_payout_not_claimed",
                SubstrateMetric::NoHeartbeatAndBlockAuthored => {
                    "substrate_no_heartbeat_and_block_authored"
                }
                SubstrateMetric::ValidatorNotActive => "substrate_validator_not_active",
                SubstrateMetric::NewReferendum => "substrate_new_referendum",
                SubstrateMetric::WebsocketUnreachable => "substrate_websocket_unreachable",
                SubstrateMetric::DataNotObtained => "substrate_data_not_obtained",
            },
            MetricCode::Chainlink(m) => match m {
                ChainlinkMetric::NoChangeInHeight => "chainlink_no_change_in_height",
                ChainlinkMetric::EthBalanceAmount => "chainlink_eth_balance_amount",
                ChainlinkMetric::MaxUnconfirmedBlocks => "chainlink_max_unconfirmed_blocks",
                ChainlinkMetric::ErroredJobRuns => "chainlink_errored_job_runs",
                ChainlinkMetric::NodeIsDown => "chainlink_node_is_down",
                ChainlinkMetric::PrometheusSourceUnreachable => {
                    "chainlink_prometheus_source_unreachable"
                }
                ChainlinkMetric::MetricNotFound => "chainlink_metric_not_found",
            },
        }
    }

    pub fn classifier(&self) -> ClassifierKind {
        use ClassifierKind::*;
        match self {
            MetricCode::System(m) => match m {
                SystemMetric::OpenFileDescriptors
                | SystemMetric::CpuUsage
                | SystemMetric::RamUsage
                | SystemMetric::StorageUsage => Threshold,
                SystemMetric::SystemIsDown => Downtime,
                SystemMetric::InvalidUrl | SystemMetric::MetricNotFound => Error,
            },
            MetricCode::Cosmos(m) => match m {
                CosmosMetric::NoChangeInBlockHeight => NoChange,
                CosmosMetric::BlockHeightDifference => Threshold,
                CosmosMetric::MissedBlocks => OccurrenceThreshold,
                CosmosMetric::ValidatorIsJailed => SolvableConditional,
                CosmosMetric::ValidatorWasSlashed | CosmosMetric::NewProposalSubmitted => {
                    Conditional
                }
                CosmosMetric::NodeIsDown => Downtime,
                CosmosMetric::SourceUnreachable | CosmosMetric::DataNotObtained => Error,
            },
            MetricCode::Substrate(m) => match m {
                SubstrateMetric::NoChangeInBestBlockHeight
                | SubstrateMetric::NoChangeInFinalizedBlockHeight => NoChange,
                SubstrateMetric::ValidatorIsDown => Downtime,
                SubstrateMetric::PayoutNotClaimed => EraThreshold,
                SubstrateMetric::NoHeartbeatAndBlockAuthored
                | SubstrateMetric::ValidatorNotActive => SolvableConditional,
                SubstrateMetric::NewReferendum => Conditional,
                SubstrateMetric::WebsocketUnreachable | SubstrateMetric::DataNotObtained => Error,
            },
            MetricCode::Chainlink(m) => match m {
                ChainlinkMetric::NoChangeInHeight => NoChange,
                ChainlinkMetric::EthBalanceAmount => ReverseThreshold,
                ChainlinkMetric::MaxUnconfirmedBlocks => Threshold,
                ChainlinkMetric::ErroredJobRuns => OccurrenceThreshold,
                ChainlinkMetric::NodeIsDown => Downtime,
                ChainlinkMetric::PrometheusSourceUnreachable
                | ChainlinkMetric::MetricNotFound => Error,
            },
        }
    }

    /// The upstream error code an error metric watches for.
    pub fn watched_error(&self) -> Option<ErrorCode> {
        let code = match self {
            MetricCode::System(SystemMetric::InvalidUrl) => 5009,
            MetricCode::System(SystemMetric::MetricNotFound) => 5003,
            MetricCode::Cosmos(CosmosMetric::SourceUnreachable) => 5011,
            MetricCode::Cosmos(CosmosMetric::DataNotObtained) => 5018,
            MetricCode::Substrate(SubstrateMetric::WebsocketUnreachable) => 5013,
            MetricCode::Substrate(SubstrateMetric::DataNotObtained) => 5018,
            MetricCode::Chainlink(ChainlinkMetric::PrometheusSourceUnreachable) => 5009,
            MetricCode::Chainlink(ChainlinkMetric::MetricNotFound) => 5003,
            _ => return None,
        };
        Some(ErrorCode(code))
    }

    /// Error metrics that, while active, silence this one.
    pub fn suppressed_by(&self) -> &'static [MetricCode] {
        match self {
            MetricCode::System(SystemMetric::MetricNotFound) => {
                &[MetricCode::System(SystemMetric::InvalidUrl)]
            }
            MetricCode::Cosmos(CosmosMetric::DataNotObtained) => {
                &[MetricCode::Cosmos(CosmosMetric::SourceUnreachable)]
            }
            MetricCode::Substrate(SubstrateMetric::DataNotObtained) => {
                &[MetricCode::Substrate(SubstrateMetric::WebsocketUnreachable)]
            }
            MetricCode::Chainlink(ChainlinkMetric::MetricNotFound) => {
                &[MetricCode::Chainlink(ChainlinkMetric::PrometheusSourceUnreachable)]
            }
            _ => &[],
        }
    }

    /// Error metrics of the same chain family, root causes first.
    pub fn family_error_metrics(&self) -> Vec<MetricCode> {
        let mut metrics: Vec<MetricCode> = ALL
            .iter()
            .copied()
            .filter(|m| m.same_family(self) && m.classifier() == ClassifierKind::Error)
            .collect();
        metrics.sort_by_key(|m| m.suppressed_by().len());
        metrics
    }

    pub fn same_family(&self, other: &MetricCode) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for MetricCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown metric code: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for MetricCode {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL.iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

impl Serialize for MetricCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MetricCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
