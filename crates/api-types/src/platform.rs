use serde::{Deserialize, Serialize};
use sqlx::Type;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use ts_rs::TS;

/// Messaging channel a conversation (and each of its messages) runs over.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Type,
    TS,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[sqlx(type_name = "platform", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    Whatsapp,
    Instagram,
    Facebook,
    Twitter,
    Telegram,
    Email,
    Widget,
    VoiceCall,
    Sms,
}

/// External identifiers of a customer, one slot per known platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct PlatformIdentifiers {
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub facebook: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub telegram: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub widget: Option<String>,
    #[serde(default)]
    pub voice_call: Option<String>,
    #[serde(default)]
    pub sms: Option<String>,
}

impl PlatformIdentifiers {
    /// Identifiers with only the given slot filled.
    pub fn single(platform: Platform, platform_id: impl Into<String>) -> Self {
        let mut identifiers = Self::default();
        *identifiers.slot_mut(platform) = Some(platform_id.into());
        identifiers
    }

    pub fn get(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Whatsapp => self.whatsapp.as_deref(),
            Platform::Instagram => self.instagram.as_deref(),
            Platform::Facebook => self.facebook.as_deref(),
            Platform::Twitter => self.twitter.as_deref(),
            Platform::Telegram => self.telegram.as_deref(),
            Platform::Email => self.email.as_deref(),
            Platform::Widget => self.widget.as_deref(),
            Platform::VoiceCall => self.voice_call.as_deref(),
            Platform::Sms => self.sms.as_deref(),
        }
    }

    pub fn slot_mut(&mut self, platform: Platform) -> &mut Option<String> {
        match platform {
            Platform::Whatsapp => &mut self.whatsapp,
            Platform::Instagram => &mut self.instagram,
            Platform::Facebook => &mut self.facebook,
            Platform::Twitter => &mut self.twitter,
            Platform::Telegram => &mut self.telegram,
            Platform::Email => &mut self.email,
            Platform::Widget => &mut self.widget,
            Platform::VoiceCall => &mut self.voice_call,
            Platform::Sms => &mut self.sms,
        }
    }

    pub fn matches(&self, platform: Platform, platform_id: &str) -> bool {
        self.get(platform) == Some(platform_id)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn platform_names_round_trip_through_strings() {
        assert_eq!(Platform::VoiceCall.as_ref(), "voice_call");
        assert_eq!(Platform::from_str("whatsapp").unwrap(), Platform::Whatsapp);
        assert!(Platform::from_str("myspace").is_err());
    }

    #[test]
    fn single_fills_exactly_one_slot() {
        let identifiers = PlatformIdentifiers::single(Platform::Telegram, "tg-42");
        assert!(identifiers.matches(Platform::Telegram, "tg-42"));
        assert_eq!(identifiers.get(Platform::Whatsapp), None);

        let json = serde_json::to_value(&identifiers).unwrap();
        assert_eq!(json["telegram"], "tg-42");
        assert!(json["whatsapp"].is_null());
    }
}
