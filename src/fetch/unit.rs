//! The per-URL fetch unit
//!
//! A unit moves through `Pending -> InFlight -> Succeeded | Failed`. Only a
//! succeeded unit holds a buffer, and the buffer is released when the unit is
//! released or dropped.

use std::{fmt, io};
use tracing::{info, instrument, trace, warn};
use ulid::Ulid;

use super::http::{Fetched, Fetcher};
use super::models::{BufferKind, DEFAULT_BUFFER_THRESHOLD, SourceItem, file_name_from_url};
use super::spool::SpoolBuffer;
use super::FetchError;

#[derive(Debug)]
pub enum FetchState {
    /// Created, not yet admitted
    Pending,
    /// A fetch is running
    InFlight,
    /// Terminal: the body is fully buffered
    Succeeded(SpoolBuffer),
    /// Terminal: the fetch failed with this cause
    Failed(FetchError),
}

impl FetchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InFlight => write!(f, "InFlight"),
            Self::Succeeded(_) => write!(f, "Succeeded"),
            Self::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}

/// The body of a succeeded unit, detached from it
#[derive(Debug)]
pub struct Completed {
    pub id: Ulid,
    pub url: String,
    /// Explicit name, or the one resolved from the response location
    pub name: String,
    pub buffer: SpoolBuffer,
}

impl Completed {
    pub fn release(self) -> io::Result<()> {
        self.buffer.release()
    }
}

/// A unit after its fetch, split by outcome
#[derive(Debug)]
pub enum FetchOutcome {
    Succeeded(Completed),
    Failed {
        id: Ulid,
        url: String,
        error: FetchError,
    },
    /// The unit never reached a terminal state
    Unfinished(FetchUnit),
}

#[derive(Debug)]
pub struct FetchUnit {
    id: Ulid,
    url: String,
    name: Option<String>,
    buffer_threshold: u64,
    state: FetchState,
}

impl FetchUnit {
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_item(SourceItem::new(url), DEFAULT_BUFFER_THRESHOLD)
    }

    /// Build a unit from an input item, using `default_threshold` unless the item overrides it
    pub fn from_item(item: SourceItem, default_threshold: u64) -> Self {
        Self {
            id: Ulid::new(),
            url: item.url,
            name: item.name,
            buffer_threshold: item.buffer_threshold.unwrap_or(default_threshold),
            state: FetchState::Pending,
        }
    }

    /// Diagnostic identifier, unique within the process
    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Explicit name, or the one resolved from the response location after success
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn buffer_threshold(&self) -> u64 {
        self.buffer_threshold
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn buffer(&self) -> Option<&SpoolBuffer> {
        match &self.state {
            FetchState::Succeeded(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn buffer_kind(&self) -> Option<BufferKind> {
        self.buffer().map(SpoolBuffer::kind)
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        match &self.state {
            FetchState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Split a finished unit into its buffer or its failure cause; other units come back whole
    pub fn into_outcome(mut self) -> FetchOutcome {
        match std::mem::replace(&mut self.state, FetchState::Pending) {
            FetchState::Failed(error) => FetchOutcome::Failed {
                id: self.id,
                url: self.url,
                error,
            },
            FetchState::Succeeded(buffer) => FetchOutcome::Succeeded(Completed {
                id: self.id,
                url: self.url,
                name: self.name.unwrap_or_default(),
                buffer,
            }),
            state => {
                self.state = state;
                FetchOutcome::Unfinished(self)
            }
        }
    }

    /// Run the fetch and return whether it succeeded
    ///
    /// A unit that already reached a terminal state returns its previous outcome
    /// without touching the network. On failure the cause is available from
    /// [`FetchUnit::last_error`].
    #[instrument(name = "fetch", level = "debug", skip_all, fields(id = %self.id, url = %self.url))]
    pub async fn fetch(&mut self, fetcher: &Fetcher) -> bool {
        match &self.state {
            FetchState::Succeeded(_) => {
                trace!("Already fetched, skipping");
                return true;
            }
            FetchState::Failed(_) => {
                trace!("Already failed, skipping");
                return false;
            }
            FetchState::Pending | FetchState::InFlight => {}
        }

        self.state = FetchState::InFlight;

        match fetcher.fetch(&self.url, self.buffer_threshold).await {
            Ok(Fetched {
                buffer,
                resolved_url,
            }) => {
                if self.name.is_none() {
                    self.name = Some(file_name_from_url(&resolved_url));
                }
                info!(
                    bytes = buffer.len(),
                    storage = %buffer.kind(),
                    name = ?self.name,
                    "Fetch completed"
                );
                self.state = FetchState::Succeeded(buffer);
                true
            }
            Err(e) => {
                warn!(error = %e, "Fetch failed");
                self.state = FetchState::Failed(e);
                false
            }
        }
    }

    /// Release the unit's buffer now instead of on drop
    pub fn release(self) -> io::Result<()> {
        match self.state {
            FetchState::Succeeded(buffer) => buffer.release(),
            _ => Ok(()),
        }
    }
}

impl From<SourceItem> for FetchUnit {
    fn from(item: SourceItem) -> Self {
        Self::from_item(item, DEFAULT_BUFFER_THRESHOLD)
    }
}
