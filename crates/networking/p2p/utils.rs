use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn current_unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn get_msg_expiration_from_seconds(seconds: u64) -> u64 {
    (SystemTime::now() + Duration::from_secs(seconds))
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiration_is_in_the_future() {
        let now = current_unix_time();
        let expiration = get_msg_expiration_from_seconds(20);
        assert!(expiration >= now + 20);
        assert!(expiration <= now + 21);
    }
}
