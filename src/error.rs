//! Closed error taxonomy for the targeting engine.
//!
//! Every failure path in the coordinator and the eligibility checker resolves
//! to one of these variants; the HTTP layer consumes `code()` and
//! `http_status()` verbatim, so callers always learn *why* an operation was
//! denied rather than receiving a generic failure.

#[derive(thiserror::Error, Debug)]
pub enum TargetingError {
    #[error("a swap cannot target itself or another swap owned by the same user")]
    CannotTargetOwnSwap,

    #[error("targeting this swap would close a circular targeting chain")]
    CircularTargeting,

    #[error("the auction on this swap has already ended")]
    AuctionEnded,

    #[error("this swap already has a pending proposal")]
    ProposalPending,

    #[error("this swap is not open for targeting (current state: {state})")]
    SwapUnavailable { state: String },

    #[error("{0} was not found")]
    NotFound(String),

    #[error("user {user_id} is not allowed to act on swap {swap_id}")]
    NotAuthorized { user_id: String, swap_id: String },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("edge {edge_id} cannot move from {from} to {to}")]
    InvalidTransition {
        edge_id: String,
        from: String,
        to: String,
    },

    #[error("rate limit exceeded, retry later")]
    RateLimited,

    #[error("storage error: {0}")]
    Store(#[from] sled::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),

    #[error("decoding error: {0}")]
    Decode(#[from] minicbor::decode::Error),
}

impl TargetingError {
    /// Stable wire code consumed by the controller layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CannotTargetOwnSwap => "CANNOT_TARGET_OWN_SWAP",
            Self::CircularTargeting => "CIRCULAR_TARGETING",
            Self::AuctionEnded => "AUCTION_ENDED",
            Self::ProposalPending => "PROPOSAL_PENDING",
            Self::SwapUnavailable { .. } => "SWAP_UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::NotAuthorized { .. } => "NOT_AUTHORIZED",
            Self::Validation(_) | Self::InvalidTransition { .. } => "VALIDATION_ERROR",
            Self::RateLimited => "RATE_LIMIT_EXCEEDED",
            Self::Store(_) | Self::Encode(_) | Self::Decode(_) => "SYSTEM_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::CannotTargetOwnSwap | Self::AuctionEnded | Self::Validation(_) => 400,
            Self::InvalidTransition { .. } => 400,
            Self::CircularTargeting | Self::ProposalPending | Self::SwapUnavailable { .. } => 409,
            Self::NotFound(_) => 404,
            Self::NotAuthorized { .. } => 403,
            Self::RateLimited => 429,
            Self::Store(_) | Self::Encode(_) | Self::Decode(_) => 500,
        }
    }

    /// System errors are safe for the caller to retry; business-rule denials
    /// are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Encode(_) | Self::Decode(_))
    }
}

pub type Result<T> = std::result::Result<T, TargetingError>;
