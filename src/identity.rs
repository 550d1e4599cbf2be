//! Access gate: a registered profile or a time-boxed daily guest window.
//!
//! The gate only answers "is there a usable identity"; it performs no
//! authentication. Registration is stored locally and pushed best-effort to
//! every remote store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::store::local::{LocalStore, GUEST_DATA_KEY, USER_PROFILE_KEY};
use crate::store::{RemoteStore, StoreError};
use crate::session::types::UserProfile;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("please fill in all fields (missing: {0})")]
    MissingFields(String),

    #[error("today's guest session has already been used, please register for full access")]
    GuestWindowUsed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persisted guest window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestData {
    /// UTC calendar day, `YYYY-MM-DD`.
    pub date: String,
    /// Epoch ms.
    pub start_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Registered { profile: UserProfile },
    Guest { started_at: i64, minutes_remaining: i64 },
    None,
}

impl Identity {
    pub fn is_some(&self) -> bool {
        !matches!(self, Self::None)
    }
}

pub struct IdentityGate {
    local: Arc<LocalStore>,
    remotes: Vec<Arc<dyn RemoteStore>>,
    guest_limit: Duration,
}

impl IdentityGate {
    pub fn new(local: Arc<LocalStore>, remotes: Vec<Arc<dyn RemoteStore>>, guest_limit_minutes: i64) -> Self {
        Self {
            local,
            remotes,
            guest_limit: Duration::minutes(guest_limit_minutes),
        }
    }

    pub fn has_identity(&self) -> bool {
        self.current().map(|id| id.is_some()).unwrap_or(false)
    }

    pub fn current(&self) -> Result<Identity, IdentityError> {
        self.current_at(Utc::now())
    }

    pub fn current_at(&self, now: DateTime<Utc>) -> Result<Identity, IdentityError> {
        match self.local.user_profile() {
            Ok(Some(profile)) => return Ok(Identity::Registered { profile }),
            Ok(None) => {}
            Err(e @ StoreError::Parse { .. }) => {
                tracing::error!(error = %e, "invalid user profile");
            }
            Err(e) => return Err(e.into()),
        }

        let Some(guest) = self.today_guest(now)? else {
            return Ok(Identity::None);
        };
        let remaining = self.remaining(&guest, now);
        if remaining > Duration::zero() {
            Ok(Identity::Guest {
                started_at: guest.start_time,
                minutes_remaining: remaining.num_minutes(),
            })
        } else {
            Ok(Identity::None)
        }
    }

    /// Whole minutes left in an active guest window, 0 otherwise.
    pub fn guest_minutes_remaining(&self) -> Result<i64, IdentityError> {
        Ok(match self.current()? {
            Identity::Guest {
                minutes_remaining, ..
            } => minutes_remaining,
            _ => 0,
        })
    }

    /// Register a user. Every field is required.
    pub async fn register(&self, name: &str, email: &str, mobile: &str) -> Result<UserProfile, IdentityError> {
        let fields = [("name", name.trim()), ("email", email.trim()), ("mobile", mobile.trim())];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(IdentityError::MissingFields(missing.join(", ")));
        }

        let profile = UserProfile {
            name: fields[0].1.to_string(),
            email: fields[1].1.to_string(),
            mobile: fields[2].1.to_string(),
            registered_at: Utc::now().timestamp_millis(),
        };
        self.local.set_user_profile(&profile)?;
        tracing::info!(key = %profile.storage_key(), "user registered");

        let saves = self.remotes.iter().map(|remote| {
            let profile = &profile;
            async move {
                if !remote.initialize().await {
                    return;
                }
                if remote.save_profile(profile).await {
                    tracing::info!(store = remote.name(), "user profile saved");
                }
            }
        });
        futures::future::join_all(saves).await;

        Ok(profile)
    }

    pub fn start_guest(&self) -> Result<Identity, IdentityError> {
        self.start_guest_at(Utc::now())
    }

    /// Open (or resume) today's guest window.
    pub fn start_guest_at(&self, now: DateTime<Utc>) -> Result<Identity, IdentityError> {
        let guest = match self.today_guest(now)? {
            Some(guest) if self.remaining(&guest, now) > Duration::zero() => guest,
            Some(_) => return Err(IdentityError::GuestWindowUsed),
            None => {
                let guest = GuestData {
                    date: utc_day(now),
                    start_time: now.timestamp_millis(),
                };
                self.local.set_guest_data(&guest)?;
                tracing::info!(date = %guest.date, "guest session started");
                guest
            }
        };
        Ok(Identity::Guest {
            started_at: guest.start_time,
            minutes_remaining: self.remaining(&guest, now).num_minutes(),
        })
    }

    pub fn logout(&self) -> Result<(), IdentityError> {
        self.local.remove(USER_PROFILE_KEY)?;
        self.local.remove(GUEST_DATA_KEY)?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Today's guest data. Data from an earlier day is removed.
    fn today_guest(&self, now: DateTime<Utc>) -> Result<Option<GuestData>, IdentityError> {
        let guest: Option<GuestData> = match self.local.guest_data() {
            Ok(guest) => guest,
            Err(e @ StoreError::Parse { .. }) => {
                tracing::warn!(error = %e, "invalid guest data, discarding");
                self.local.remove(GUEST_DATA_KEY)?;
                None
            }
            Err(e) => return Err(e.into()),
        };
        match guest {
            Some(guest) if guest.date == utc_day(now) => Ok(Some(guest)),
            Some(_) => {
                self.local.remove(GUEST_DATA_KEY)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn remaining(&self, guest: &GuestData, now: DateTime<Utc>) -> Duration {
        let started = Utc
            .timestamp_millis_opt(guest.start_time)
            .single()
            .unwrap_or(now);
        self.guest_limit - (now - started)
    }
}

fn utc_day(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> IdentityGate {
        IdentityGate::new(Arc::new(LocalStore::in_memory().unwrap()), Vec::new(), 60)
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    #[test]
    fn no_identity_by_default() {
        assert_eq!(gate().current_at(at(9, 0)).unwrap(), Identity::None);
    }

    #[test]
    fn guest_window_counts_down_and_expires() {
        let gate = gate();
        let started = gate.start_guest_at(at(9, 0)).unwrap();
        assert!(matches!(started, Identity::Guest { minutes_remaining: 60, .. }));

        match gate.current_at(at(9, 45)).unwrap() {
            Identity::Guest { minutes_remaining, .. } => assert_eq!(minutes_remaining, 15),
            other => panic!("expected guest, got {other:?}"),
        }
        assert_eq!(gate.current_at(at(10, 1)).unwrap(), Identity::None);
    }

    #[test]
    fn one_guest_window_per_day() {
        let gate = gate();
        gate.start_guest_at(at(9, 0)).unwrap();
        // resuming an active window keeps its start time
        match gate.start_guest_at(at(9, 30)).unwrap() {
            Identity::Guest { started_at, .. } => assert_eq!(started_at, at(9, 0).timestamp_millis()),
            other => panic!("expected guest, got {other:?}"),
        }
        assert!(matches!(
            gate.start_guest_at(at(11, 0)),
            Err(IdentityError::GuestWindowUsed)
        ));

        let tomorrow = at(9, 0) + Duration::days(1);
        assert!(gate.start_guest_at(tomorrow).unwrap().is_some());
    }

    #[tokio::test]
    async fn registration_requires_every_field() {
        let gate = gate();
        match gate.register("Rina", " ", "").await {
            Err(IdentityError::MissingFields(fields)) => assert_eq!(fields, "email, mobile"),
            other => panic!("unexpected: {other:?}"),
        }

        let profile = gate.register("Rina", "rina@example.org", "9000000000").await.unwrap();
        assert!(matches!(
            gate.current().unwrap(),
            Identity::Registered { profile: p } if p == profile
        ));

        gate.logout().unwrap();
        assert!(!gate.has_identity());
    }
}
