//! Wire grammar for the URL cache channel (spec.md §4.3/§6).
//!
//! Bit-for-bit contract: the first byte of a request line is either a
//! command letter (`f` flush, `g` add) or, for anything else, the
//! `group_byte` of a lookup (`group_byte - 1` is the filter-group id).
//! `f` and `g` are deliberately outside the group-byte range.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Flush,
    Add { group: u32, url: String },
    Query { group: u32, url: String },
}

pub const CMD_FLUSH: u8 = b'f';
pub const CMD_ADD: u8 = b'g';
pub const RESP_PRESENT: u8 = b'Y';
pub const RESP_ABSENT: u8 = b'N';

pub fn parse_request(line: &[u8]) -> Option<Request> {
    let (&first, rest) = line.split_first()?;
    match first {
        CMD_FLUSH => Some(Request::Flush),
        CMD_ADD => {
            let (&group_byte, url_bytes) = rest.split_first()?;
            let group = group_byte.checked_sub(1)? as u32;
            let url = std::str::from_utf8(url_bytes).ok()?.to_string();
            Some(Request::Add { group, url })
        }
        group_byte => {
            let group = group_byte.checked_sub(1)? as u32;
            let url = std::str::from_utf8(rest).ok()?.to_string();
            Some(Request::Query { group, url })
        }
    }
}

pub fn encode_add(group: u32, url: &str) -> Option<Vec<u8>> {
    let group_byte = u8::try_from(group + 1).ok()?;
    if group_byte == CMD_FLUSH || group_byte == CMD_ADD {
        return None;
    }
    let mut buf = Vec::with_capacity(2 + url.len() + 1);
    buf.push(CMD_ADD);
    buf.push(group_byte);
    buf.extend_from_slice(url.as_bytes());
    buf.push(b'\n');
    Some(buf)
}

pub fn encode_query(group: u32, url: &str) -> Option<Vec<u8>> {
    let group_byte = u8::try_from(group + 1).ok()?;
    if group_byte == CMD_FLUSH || group_byte == CMD_ADD {
        return None;
    }
    let mut buf = Vec::with_capacity(1 + url.len() + 1);
    buf.push(group_byte);
    buf.extend_from_slice(url.as_bytes());
    buf.push(b'\n');
    Some(buf)
}

pub fn encode_flush() -> Vec<u8> {
    vec![CMD_FLUSH, b'\n']
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flush() {
        assert_eq!(parse_request(b"f"), Some(Request::Flush));
    }

    #[test]
    fn parses_add() {
        let req = parse_request(b"g\x02http://a/").unwrap();
        assert_eq!(
            req,
            Request::Add {
                group: 1,
                url: "http://a/".to_string()
            }
        );
    }

    #[test]
    fn parses_query() {
        let req = parse_request(b"\x02http://a/").unwrap();
        assert_eq!(
            req,
            Request::Query {
                group: 1,
                url: "http://a/".to_string()
            }
        );
    }

    #[test]
    fn group_byte_zero_is_invalid() {
        assert!(parse_request(b"\x00http://a/").is_none());
    }

    #[test]
    fn encode_round_trips_with_parse() {
        let add = encode_add(3, "http://example.com/").unwrap();
        // Strip the trailing newline the wire framing adds.
        let req = parse_request(&add[..add.len() - 1]).unwrap();
        assert_eq!(
            req,
            Request::Add {
                group: 3,
                url: "http://example.com/".to_string()
            }
        );
    }

    #[test]
    fn encode_rejects_groups_colliding_with_command_letters() {
        // group_byte for group 101 is 'f' (0x66), for group 102 is 'g' (0x67).
        assert!(encode_query(101, "http://a/").is_none());
        assert!(encode_query(102, "http://a/").is_none());
    }
}
