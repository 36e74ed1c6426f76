//! Authentication plugins (C6, spec.md §3/§4.6), grounded on
//! `authplugins/proxy.cpp` and `authplugins/ip.cpp`.

use std::net::Ipv4Addr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// The three-way outcome every auth plugin contract returns: the
/// plugin matched and identified a user, the plugin doesn't apply to
/// this request at all (try the next one), or the plugin applies but
/// couldn't extract a user from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Ok(String),
    NoMatch,
    NoUser,
}

pub struct AuthRequest<'a> {
    pub client_ip: Ipv4Addr,
    pub proxy_authorization: Option<&'a str>,
}

pub trait AuthPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn init(&mut self) -> crate::Result<()> {
        Ok(())
    }
    fn quit(&mut self) -> crate::Result<()> {
        Ok(())
    }
    fn identify(&self, request: &AuthRequest) -> AuthResult;
}

/// Identifies the user from a `Proxy-Authorization: Basic <b64>`
/// header. Does not itself verify a password; by the time a request
/// reaches here the upstream client is assumed already authenticated,
/// matching `proxy.cpp`'s identification-only role.
pub struct ProxyAuthPlugin;

impl AuthPlugin for ProxyAuthPlugin {
    fn name(&self) -> &'static str {
        "proxy-auth"
    }

    fn identify(&self, request: &AuthRequest) -> AuthResult {
        let Some(header) = request.proxy_authorization else {
            return AuthResult::NoMatch;
        };
        let Some(encoded) = header.strip_prefix("Basic ") else {
            return AuthResult::NoMatch;
        };
        let Ok(decoded) = BASE64.decode(encoded.trim()) else {
            return AuthResult::NoUser;
        };
        let Ok(text) = String::from_utf8(decoded) else {
            return AuthResult::NoUser;
        };
        match text.split_once(':') {
            Some((user, _pass)) if !user.is_empty() => AuthResult::Ok(user.to_string()),
            _ => AuthResult::NoUser,
        }
    }
}

/// Identifies the user as its own source IP address. Always matches,
/// since every request carries a source IP (`ip.cpp`).
pub struct IpAuthPlugin;

impl AuthPlugin for IpAuthPlugin {
    fn name(&self) -> &'static str {
        "ip"
    }

    fn identify(&self, request: &AuthRequest) -> AuthResult {
        AuthResult::Ok(request.client_ip.to_string())
    }
}

/// Runs `plugins` in order, returning the first non-`NoMatch` result.
/// `NoUser` still short-circuits the chain: once a plugin recognises
/// the request shape it owns the outcome.
pub fn identify(plugins: &[Box<dyn AuthPlugin>], request: &AuthRequest) -> AuthResult {
    for plugin in plugins {
        match plugin.identify(request) {
            AuthResult::NoMatch => continue,
            other => return other,
        }
    }
    AuthResult::NoMatch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_header(user: &str, pass: &str) -> String {
        format!("Basic {}", BASE64.encode(format!("{user}:{pass}")))
    }

    #[test]
    fn proxy_auth_identifies_valid_header() {
        let plugin = ProxyAuthPlugin;
        let header = basic_header("alice", "secret");
        let req = AuthRequest {
            client_ip: "10.0.0.1".parse().unwrap(),
            proxy_authorization: Some(&header),
        };
        assert_eq!(plugin.identify(&req), AuthResult::Ok("alice".to_string()));
    }

    #[test]
    fn proxy_auth_missing_header_is_no_match() {
        let plugin = ProxyAuthPlugin;
        let req = AuthRequest {
            client_ip: "10.0.0.1".parse().unwrap(),
            proxy_authorization: None,
        };
        assert_eq!(plugin.identify(&req), AuthResult::NoMatch);
    }

    #[test]
    fn proxy_auth_garbage_base64_is_no_user() {
        let plugin = ProxyAuthPlugin;
        let header = "Basic ???not-base64???".to_string();
        let req = AuthRequest {
            client_ip: "10.0.0.1".parse().unwrap(),
            proxy_authorization: Some(&header),
        };
        assert_eq!(plugin.identify(&req), AuthResult::NoUser);
    }

    #[test]
    fn ip_auth_always_matches() {
        let plugin = IpAuthPlugin;
        let req = AuthRequest {
            client_ip: "192.168.1.1".parse().unwrap(),
            proxy_authorization: None,
        };
        assert_eq!(plugin.identify(&req), AuthResult::Ok("192.168.1.1".to_string()));
    }

    #[test]
    fn chain_falls_through_to_next_plugin_on_no_match() {
        let plugins: Vec<Box<dyn AuthPlugin>> = vec![Box::new(ProxyAuthPlugin), Box::new(IpAuthPlugin)];
        let req = AuthRequest {
            client_ip: "10.1.1.1".parse().unwrap(),
            proxy_authorization: None,
        };
        assert_eq!(identify(&plugins, &req), AuthResult::Ok("10.1.1.1".to_string()));
    }
}
