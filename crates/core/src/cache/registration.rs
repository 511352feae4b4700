//! Persisted record of the version currently controlling clients.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// The activated version and when it took control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub active_version: String,
    pub activated_at: String,
}

impl CacheDb {
    /// The last activated version, if any version was ever activated.
    pub async fn registration(&self) -> Result<Option<Registration>, Error> {
        self.conn
            .call(|conn| -> Result<Option<Registration>, Error> {
                let result =
                    conn.query_row("SELECT active_version, activated_at FROM registration WHERE id = 1", [], |row| {
                        Ok(Registration { active_version: row.get(0)?, activated_at: row.get(1)? })
                    });

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Record `version` as the active version.
    pub async fn set_active_version(&self, version: &str) -> Result<Registration, Error> {
        let registration =
            Registration { active_version: version.to_string(), activated_at: chrono::Utc::now().to_rfc3339() };
        let row = registration.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO registration (id, active_version, activated_at) VALUES (1, ?1, ?2)
                    ON CONFLICT(id) DO UPDATE SET
                        active_version = excluded.active_version,
                        activated_at = excluded.activated_at",
                    params![row.active_version, row.activated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;
        Ok(registration)
    }
}
