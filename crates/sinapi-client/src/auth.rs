//! Bearer-token handling for the upstream login endpoint.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Credentials body for `POST api/Authentication/login`.
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
  pub login: &'a str,
  pub senha: &'a str,
}

/// Login response. `usuario` is a large profile object nobody here reads.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
  pub token:   String,
  pub expires: String,
}

/// A cached bearer token together with its parsed expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
}

impl AuthToken {
  pub(crate) fn from_login(resp: LoginResponse) -> Result<Self> {
    if resp.token.is_empty() {
      return Err(Error::Auth("login returned an empty token".into()));
    }
    Ok(Self { token: resp.token, expires_at: parse_expiry(&resp.expires)? })
  }

  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool { now < self.expires_at }

  pub fn is_valid(&self) -> bool { self.is_valid_at(Utc::now()) }
}

/// Parse upstream's expiry timestamp.
///
/// Upstream emits .NET-style timestamps with up to seven fractional digits,
/// e.g. `2024-05-01T12:34:56.1234567+00:00`. The fraction is cut to six
/// digits before parsing so the value reads the same as a microsecond
/// timestamp would. A timestamp without an offset is taken as UTC.
pub fn parse_expiry(raw: &str) -> Result<DateTime<Utc>> {
  let normalized = truncate_fraction(raw.trim());

  if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
    .map(|naive| naive.and_utc())
    .map_err(|e| Error::Auth(format!("unparseable token expiry {raw:?}: {e}")))
}

fn truncate_fraction(raw: &str) -> String {
  let Some(dot) = raw.find('.') else {
    return raw.to_owned();
  };
  let frac_len = raw[dot + 1..]
    .find(|c: char| !c.is_ascii_digit())
    .unwrap_or(raw.len() - dot - 1);
  if frac_len <= 6 {
    return raw.to_owned();
  }
  let frac_end = dot + 1 + frac_len;
  format!("{}{}", &raw[..dot + 7], &raw[frac_end..])
}
