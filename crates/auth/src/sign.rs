/// Sign a side-channel request.
///
/// The gateway's mtop-style scheme: MD5 hex digest over the ordered
/// concatenation `token&timestamp&appKey&payload`.
pub fn sign(token: &str, timestamp_ms: u64, app_key: &str, payload: &str) -> String {
    let message = format!("{token}&{timestamp_ms}&{app_key}&{payload}");
    format!("{:x}", md5::compute(message.as_bytes()))
}
