//! Client fingerprint presented to the remote service.
//!
//! The API only answers requests that look like they come from an accepted
//! build of the official Android app. The exact header set is an external,
//! unversioned contract that changes with app releases, so it is modeled
//! as configuration data here rather than scattered through the request
//! code. When the upstream contract shifts, this module is the only seam
//! that needs updating.

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReminiError, Result};

/// Header values identifying an accepted client build.
///
/// The defaults mirror a current production Android build. Embedders can
/// deserialize an updated fingerprint from their own configuration when
/// the service stops accepting these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppFingerprint {
    pub bsp_id: String,
    pub build_number: String,
    pub build_version: String,
    pub country: String,
    pub device_manufacturer: String,
    pub device_model: String,
    pub device_type: String,
    pub language: String,
    pub locale: String,
    pub os_version: String,
    pub platform: String,
    pub timezone: String,
    pub user_agent: String,
    pub app_set_id: String,
}

impl Default for AppFingerprint {
    fn default() -> Self {
        Self {
            bsp_id: "com.bigwinepot.nwdn.international.android".into(),
            build_number: "202514479".into(),
            build_version: "3.7.1020".into(),
            country: "US".into(),
            device_manufacturer: "Samsung".into(),
            device_model: "SM-G998B".into(),
            device_type: "6.8".into(),
            language: "en".into(),
            locale: "en_US".into(),
            os_version: "33".into(),
            platform: "Android".into(),
            timezone: "America/New_York".into(),
            user_agent: "okhttp/4.12.0".into(),
            app_set_id: "d44bd45a-a45d-4470-9674-7348a8e3fb71".into(),
        }
    }
}

/// Randomized per-session device identifiers.
///
/// A consistent set is generated once per client so the service sees one
/// plausible device across the whole session.
#[derive(Debug, Clone)]
pub struct DeviceIds {
    pub android_id: String,
    pub aaid: String,
    pub backup_persistent_id: String,
    pub non_backup_persistent_id: String,
}

impl DeviceIds {
    pub fn generate(bsp_package: &str) -> Self {
        let android_id: String = Uuid::new_v4().simple().to_string()[..16].to_string();
        Self {
            backup_persistent_id: format!(
                "{}_{}",
                android_id,
                bsp_package.trim_end_matches(".android")
            ),
            android_id,
            aaid: Uuid::new_v4().to_string(),
            non_backup_persistent_id: Uuid::new_v4().to_string(),
        }
    }
}

fn put(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| ReminiError::Auth(format!("invalid header value for {}: {}", name, e)))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

impl AppFingerprint {
    /// Base headers attached to every API request.
    pub fn base_headers(&self, device: &DeviceIds, token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        put(&mut headers, "bsp-id", &self.bsp_id)?;
        put(&mut headers, "build-number", &self.build_number)?;
        put(&mut headers, "build-version", &self.build_version)?;
        put(&mut headers, "country", &self.country)?;
        put(&mut headers, "device-manufacturer", &self.device_manufacturer)?;
        put(&mut headers, "device-model", &self.device_model)?;
        put(&mut headers, "device-type", &self.device_type)?;
        put(&mut headers, "language", &self.language)?;
        put(&mut headers, "locale", &self.locale)?;
        put(&mut headers, "os-version", &self.os_version)?;
        put(&mut headers, "platform", &self.platform)?;
        put(&mut headers, "timezone", &self.timezone)?;
        put(&mut headers, "android-id", &device.android_id)?;
        put(&mut headers, "aaid", &device.aaid)?;
        put(&mut headers, "user-agent", &self.user_agent)?;
        if let Some(token) = token {
            put(&mut headers, "identity-token", token)?;
        }
        Ok(headers)
    }

    /// Extra headers required only by the handshake (`/setup`) request.
    pub fn handshake_headers(&self, device: &DeviceIds) -> Result<HeaderMap> {
        let mut headers = self.base_headers(device, None)?;
        // The service expects seconds-since-epoch in exponent notation
        put(
            &mut headers,
            "first-install-timestamp",
            &format!("{}E9", Utc::now().timestamp()),
        )?;
        put(&mut headers, "backup-persistent-id", &device.backup_persistent_id)?;
        put(
            &mut headers,
            "non-backup-persistent-id",
            &device.non_backup_persistent_id,
        )?;
        put(&mut headers, "environment", "Production")?;
        put(&mut headers, "settings-response-version", "v2")?;
        put(&mut headers, "is-app-running-in-background", "false")?;
        put(&mut headers, "is-old-user", "true")?;
        put(&mut headers, "app-set-id", &self.app_set_id)?;
        Ok(headers)
    }
}
