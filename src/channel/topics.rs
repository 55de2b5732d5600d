/// Per-device topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub sync: String,
    pub shadow_update: String,
    pub capture_response: String,
    pub status: String,
}

impl Topics {
    pub fn for_device(device_id: &str) -> Self {
        let base = format!("cityeye/{}", device_id);
        Self {
            sync: format!("{}/sync", base),
            shadow_update: format!("{}/shadow/update", base),
            capture_response: format!("{}/capture/response", base),
            status: format!("{}/status", base),
        }
    }
}
