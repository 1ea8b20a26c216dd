//! Payloads of the three modeled actions

use crate::station::StationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registration status returned in a boot response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RegistrationStatus {
    /// Charge point accepted by the central system
    Accepted,
    /// Central system not yet ready to accept
    Pending,
    /// Charge point refused
    Rejected,
}

/// BootNotification request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    /// Station identifier, duplicated into the payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cp_id: Option<String>,
    pub charge_point_vendor: String,
    pub charge_point_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_point_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_box_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iccid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_serial_number: Option<String>,
}

/// BootNotification response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    pub status: RegistrationStatus,
    pub current_time: String,
    /// Heartbeat interval in seconds
    pub interval: u64,
}

impl BootNotificationResponse {
    /// Accept a charge point with the given heartbeat interval
    pub fn accepted(now: DateTime<Utc>, interval: u64) -> Self {
        Self {
            status: RegistrationStatus::Accepted,
            current_time: crate::wire_timestamp(now),
            interval,
        }
    }
}

/// Heartbeat request, always empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {}

/// Heartbeat response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: String,
}

impl HeartbeatResponse {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            current_time: crate::wire_timestamp(now),
        }
    }
}

/// StatusNotification request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotificationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cp_id: Option<String>,
    pub connector_id: u32,
    pub status: StationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_error_code: Option<String>,
}

impl StatusNotificationRequest {
    /// Station-wide (connector 0) notification stamped with `now`
    pub fn station_wide(cp_id: &str, status: StationStatus, now: DateTime<Utc>) -> Self {
        Self {
            cp_id: Some(cp_id.to_string()),
            connector_id: 0,
            status,
            error_code: None,
            info: None,
            timestamp: Some(crate::wire_timestamp(now)),
            vendor_id: None,
            vendor_error_code: None,
        }
    }
}
