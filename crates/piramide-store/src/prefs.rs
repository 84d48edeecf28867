use anyhow::Result;
use tracing::info;
use uuid::Uuid;

use piramide_types::models::Theme;

use crate::LocalStore;
use crate::queries::query_preference;

pub const THEME_KEY: &str = "tema";
pub const FINGERPRINT_KEY: &str = "fingerprint";
/// Set once the backend has shown it has no vote endpoint.
pub const LOCAL_VOTES_KEY: &str = "votos_locais";

impl LocalStore {
    pub fn theme(&self) -> Result<Theme> {
        Ok(self.get(THEME_KEY)?.unwrap_or_default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.set(THEME_KEY, &theme)
    }

    pub fn toggle_theme(&self) -> Result<Theme> {
        let next = self.theme()?.toggle();
        self.set_theme(next)?;
        Ok(next)
    }

    /// Anonymous device fingerprint: generated once (UUIDv4), stable afterwards.
    /// Advisory abuse mitigation only, never authentication.
    pub fn fingerprint(&self) -> Result<String> {
        self.with_conn(|conn| {
            if let Some(fp) = query_preference(conn, FINGERPRINT_KEY)?
                .as_deref()
                .and_then(|raw| serde_json::from_str::<String>(raw).ok())
                .filter(|fp| !fp.is_empty())
            {
                return Ok(fp);
            }

            let fp = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO preferences (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                (FINGERPRINT_KEY, serde_json::to_string(&fp)?),
            )?;
            info!("Generated new device fingerprint");
            Ok(fp)
        })
    }

    pub fn local_vote_counting(&self) -> Result<bool> {
        Ok(self.get(LOCAL_VOTES_KEY)?.unwrap_or(false))
    }

    pub fn set_local_vote_counting(&self, enabled: bool) -> Result<()> {
        self.set(LOCAL_VOTES_KEY, &enabled)
    }
}
