//! Redis command builders
//!
//! Each function returns the exact command sent to the server, so the wire
//! form can be checked without a connection.

use std::time::Duration;

use redis::Cmd;

pub fn set(key: &str, value: &str) -> Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    cmd
}

pub fn get(key: &str) -> Cmd {
    let mut cmd = redis::cmd("GET");
    cmd.arg(key);
    cmd
}

/// `HSET key field value [field value ...]`
pub fn hash_set(key: &str, fields: &[(&str, &str)]) -> Cmd {
    let mut cmd = redis::cmd("HSET");
    cmd.arg(key);
    for (field, value) in fields {
        cmd.arg(*field).arg(*value);
    }
    cmd
}

pub fn hget_all(key: &str) -> Cmd {
    let mut cmd = redis::cmd("HGETALL");
    cmd.arg(key);
    cmd
}

/// `EXPIRE key seconds`, the TTL truncated to whole seconds
pub fn expire(key: &str, ttl: Duration) -> Cmd {
    let mut cmd = redis::cmd("EXPIRE");
    cmd.arg(key).arg(expiry_seconds(ttl));
    cmd
}

pub fn delete(key: &str) -> Cmd {
    let mut cmd = redis::cmd("DEL");
    cmd.arg(key);
    cmd
}

pub fn ping() -> Cmd {
    redis::cmd("PING")
}

/// Whole seconds of `ttl`; sub-second parts are dropped
pub fn expiry_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expire_five_minutes() {
        let cmd = expire("session:1", Duration::from_secs(5 * 60));
        assert_eq!(
            cmd.get_packed_command(),
            b"*3\r\n$6\r\nEXPIRE\r\n$9\r\nsession:1\r\n$3\r\n300\r\n".to_vec()
        );
    }

    #[test]
    fn test_expiry_truncates_fractions() {
        assert_eq!(expiry_seconds(Duration::from_millis(1999)), 1);
        assert_eq!(expiry_seconds(Duration::from_millis(999)), 0);
        assert_eq!(expiry_seconds(Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_hash_set_flattens_pairs() {
        let cmd = hash_set("user:7", &[("name", "ann"), ("role", "admin")]);
        assert_eq!(
            cmd.get_packed_command(),
            b"*6\r\n$4\r\nHSET\r\n$6\r\nuser:7\r\n$4\r\nname\r\n$3\r\nann\r\n$4\r\nrole\r\n$5\r\nadmin\r\n"
                .to_vec()
        );
    }

    #[test]
    fn test_set_and_delete() {
        assert_eq!(
            set("k", "v").get_packed_command(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n".to_vec()
        );
        assert_eq!(
            delete("k").get_packed_command(),
            b"*2\r\n$3\r\nDEL\r\n$1\r\nk\r\n".to_vec()
        );
    }
}
