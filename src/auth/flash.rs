//! One-shot flash messages
//!
//! A flash survives exactly one redirect: it is written into a cookie by
//! the handler that redirects and removed by the page that shows it.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

pub const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Notice,
    Alert,
}

impl FlashKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlashKind::Notice => "notice",
            FlashKind::Alert => "alert",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "notice" => Some(FlashKind::Notice),
            "alert" => Some(FlashKind::Alert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Notice,
            message: message.into(),
        }
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Alert,
            message: message.into(),
        }
    }

    /// Cookie carrying this flash to the next request
    pub fn into_cookie(self, secure: bool) -> Cookie<'static> {
        let value = format!(
            "{}:{}",
            self.kind.as_str(),
            urlencoding::encode(&self.message)
        );
        Cookie::build((FLASH_COOKIE, value))
            .path("/")
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .build()
    }

    /// Read and consume the flash carried by the request
    ///
    /// Returns the jar with a removal cookie queued when a flash was present.
    pub fn take(jar: CookieJar, secure: bool) -> (CookieJar, Option<Flash>) {
        let Some(raw) = jar.get(FLASH_COOKIE).map(|c| c.value().to_owned()) else {
            return (jar, None);
        };

        let mut removal = Cookie::build((FLASH_COOKIE, ""))
            .path("/")
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .build();
        removal.make_removal();
        let jar = jar.add(removal);

        (jar, Self::decode(&raw))
    }

    fn decode(raw: &str) -> Option<Flash> {
        let (kind, message) = raw.split_once(':')?;
        let kind = FlashKind::parse(kind)?;
        let message = urlencoding::decode(message).ok()?.into_owned();
        Some(Flash { kind, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_reads_message_and_queues_removal() {
        let cookie = Flash::notice("Signed in!").into_cookie(false);
        let jar = CookieJar::new().add(cookie);

        let (jar, flash) = Flash::take(jar, false);
        assert_eq!(flash, Some(Flash::notice("Signed in!")));
        assert_eq!(jar.get(FLASH_COOKIE).map(|c| c.value()), Some(""));
    }

    #[test]
    fn take_without_cookie_is_none() {
        let (_, flash) = Flash::take(CookieJar::new(), false);
        assert!(flash.is_none());
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let jar = CookieJar::new().add(Cookie::new(FLASH_COOKIE, "shout:hello"));
        let (_, flash) = Flash::take(jar, false);
        assert!(flash.is_none());
    }

    #[test]
    fn alert_survives_special_characters() {
        let cookie = Flash::alert("a; b=c & <d>").into_cookie(false);
        let jar = CookieJar::new().add(cookie);
        let (_, flash) = Flash::take(jar, false);
        assert_eq!(flash, Some(Flash::alert("a; b=c & <d>")));
    }

    #[test]
    fn secure_flag_reaches_flash_and_its_removal() {
        let cookie = Flash::notice("Signed out!").into_cookie(true);
        assert_eq!(cookie.secure(), Some(true));

        let (jar, _) = Flash::take(CookieJar::new().add(cookie), true);
        let removal = jar.get(FLASH_COOKIE).expect("removal queued");
        assert_eq!(removal.secure(), Some(true));
        assert_eq!(removal.value(), "");
    }
}
