//! Cache capability flags and their reconciliation against granted intents

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::info;
use twilight_gateway::{EventTypeFlags, Intents};

/// Optional cache features of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheFlag {
    Activity,
    ClientStatus,
    OnlineStatus,
    VoiceState,
    ScheduledEvents,
    Members,
    Messages,
    Reactions,
    MemberOverrides,
    RoleTags,
}

impl CacheFlag {
    pub const ALL: [CacheFlag; 10] = [
        CacheFlag::Activity,
        CacheFlag::ClientStatus,
        CacheFlag::OnlineStatus,
        CacheFlag::VoiceState,
        CacheFlag::ScheduledEvents,
        CacheFlag::Members,
        CacheFlag::Messages,
        CacheFlag::Reactions,
        CacheFlag::MemberOverrides,
        CacheFlag::RoleTags,
    ];

    /// Gateway intent without which this cache never receives data
    pub fn required_intent(&self) -> Option<Intents> {
        match self {
            Self::Activity | Self::ClientStatus | Self::OnlineStatus => {
                Some(Intents::GUILD_PRESENCES)
            }
            Self::VoiceState => Some(Intents::GUILD_VOICE_STATES),
            Self::ScheduledEvents => Some(Intents::GUILD_SCHEDULED_EVENTS),
            Self::Members => Some(Intents::GUILD_MEMBERS),
            Self::Messages => Some(Intents::GUILD_MESSAGES),
            Self::Reactions => Some(Intents::GUILD_MESSAGE_REACTIONS),
            Self::MemberOverrides | Self::RoleTags => None,
        }
    }

    /// Gateway events that only feed this cache
    ///
    /// Flags that share an event (the presence family) keep it alive as long
    /// as any one of them is enabled.
    pub fn event_types(&self) -> EventTypeFlags {
        match self {
            Self::Activity | Self::ClientStatus | Self::OnlineStatus => {
                EventTypeFlags::PRESENCE_UPDATE
            }
            Self::VoiceState => EventTypeFlags::VOICE_STATE_UPDATE,
            Self::ScheduledEvents => {
                EventTypeFlags::GUILD_SCHEDULED_EVENT_CREATE
                    | EventTypeFlags::GUILD_SCHEDULED_EVENT_UPDATE
                    | EventTypeFlags::GUILD_SCHEDULED_EVENT_DELETE
                    | EventTypeFlags::GUILD_SCHEDULED_EVENT_USER_ADD
                    | EventTypeFlags::GUILD_SCHEDULED_EVENT_USER_REMOVE
            }
            _ => EventTypeFlags::empty(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Activity => "ACTIVITY",
            Self::ClientStatus => "CLIENT_STATUS",
            Self::OnlineStatus => "ONLINE_STATUS",
            Self::VoiceState => "VOICE_STATE",
            Self::ScheduledEvents => "SCHEDULED_EVENTS",
            Self::Members => "MEMBERS",
            Self::Messages => "MESSAGES",
            Self::Reactions => "REACTIONS",
            Self::MemberOverrides => "MEMBER_OVERRIDES",
            Self::RoleTags => "ROLE_TAGS",
        }
    }
}

impl fmt::Display for CacheFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A flag moved to the disabled set because its intent was not granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityAdjustment {
    pub flag: CacheFlag,
    pub missing_intent: Intents,
}

/// Granted intents plus requested cache flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    granted: Intents,
    enabled: BTreeSet<CacheFlag>,
    disabled: BTreeSet<CacheFlag>,
}

impl CapabilitySet {
    pub fn new(
        granted: Intents,
        enabled: impl IntoIterator<Item = CacheFlag>,
        disabled: impl IntoIterator<Item = CacheFlag>,
    ) -> Self {
        Self {
            granted,
            enabled: enabled.into_iter().collect(),
            disabled: disabled.into_iter().collect(),
        }
    }

    /// Disable every flag whose required intent is not granted.
    ///
    /// Each flag is decided independently, so iteration order does not
    /// matter. A flag requested both enabled and disabled ends up disabled.
    /// Returns the flags that were requested enabled and had to be moved.
    pub fn reconcile(&mut self) -> Vec<CapabilityAdjustment> {
        let mut adjustments = Vec::new();

        for flag in CacheFlag::ALL {
            let Some(intent) = flag.required_intent() else {
                continue;
            };
            if self.granted.contains(intent) {
                continue;
            }

            if self.enabled.remove(&flag) {
                info!(
                    cache_flag = %flag,
                    missing_intent = ?intent,
                    "Missing required gateway intent for cache flag, disabling cache flag"
                );
                adjustments.push(CapabilityAdjustment {
                    flag,
                    missing_intent: intent,
                });
            }
            self.disabled.insert(flag);
        }

        let overlap: Vec<CacheFlag> = self.enabled.intersection(&self.disabled).copied().collect();
        for flag in overlap {
            self.enabled.remove(&flag);
        }

        adjustments
    }

    pub fn granted(&self) -> Intents {
        self.granted
    }

    pub fn enabled(&self) -> &BTreeSet<CacheFlag> {
        &self.enabled
    }

    pub fn disabled(&self) -> &BTreeSet<CacheFlag> {
        &self.disabled
    }

    pub fn is_enabled(&self, flag: CacheFlag) -> bool {
        self.enabled.contains(&flag)
    }

    /// Event filter handed to every shard
    ///
    /// Starts from every event, drops those owned by disabled flags, then
    /// restores any still needed by an enabled flag.
    pub fn event_types(&self) -> EventTypeFlags {
        let dropped = self
            .disabled
            .iter()
            .fold(EventTypeFlags::empty(), |acc, flag| acc | flag.event_types());
        let kept = self
            .enabled
            .iter()
            .fold(EventTypeFlags::empty(), |acc, flag| acc | flag.event_types());

        EventTypeFlags::all().difference(dropped).union(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_without_granted_intent_is_disabled() {
        let mut caps = CapabilitySet::new(
            Intents::GUILDS | Intents::GUILD_MEMBERS,
            [CacheFlag::Activity, CacheFlag::Members],
            [],
        );

        let adjustments = caps.reconcile();

        assert_eq!(
            adjustments,
            vec![CapabilityAdjustment {
                flag: CacheFlag::Activity,
                missing_intent: Intents::GUILD_PRESENCES,
            }]
        );
        assert!(caps.is_enabled(CacheFlag::Members));
        assert!(!caps.is_enabled(CacheFlag::Activity));
        assert!(caps.disabled().contains(&CacheFlag::Activity));
    }

    #[test]
    fn every_flag_missing_its_intent_ends_disabled_regardless_of_request() {
        let granted = Intents::GUILDS | Intents::GUILD_VOICE_STATES;
        let requests: [(&[CacheFlag], &[CacheFlag]); 3] = [
            (&CacheFlag::ALL, &[]),
            (&[], &[]),
            (&[CacheFlag::Messages], &[CacheFlag::Messages, CacheFlag::Reactions]),
        ];

        for (enabled, disabled) in requests {
            let mut caps = CapabilitySet::new(
                granted,
                enabled.iter().copied(),
                disabled.iter().copied(),
            );
            caps.reconcile();

            for flag in CacheFlag::ALL {
                if let Some(intent) = flag.required_intent() {
                    if !granted.contains(intent) {
                        assert!(caps.disabled().contains(&flag), "{flag} should be disabled");
                        assert!(!caps.enabled().contains(&flag), "{flag} should not be enabled");
                    }
                }
            }
        }
    }

    #[test]
    fn enabled_and_disabled_are_disjoint_after_reconcile() {
        let mut caps = CapabilitySet::new(
            Intents::all(),
            [CacheFlag::MemberOverrides, CacheFlag::VoiceState],
            [CacheFlag::MemberOverrides],
        );

        assert!(caps.reconcile().is_empty());
        assert!(caps.enabled().is_disjoint(caps.disabled()));
        assert!(caps.is_enabled(CacheFlag::VoiceState));
        assert!(!caps.is_enabled(CacheFlag::MemberOverrides));
    }

    #[test]
    fn flags_without_required_intent_are_untouched() {
        let mut caps = CapabilitySet::new(Intents::empty(), [CacheFlag::RoleTags], []);
        caps.reconcile();
        assert!(caps.is_enabled(CacheFlag::RoleTags));
    }

    #[test]
    fn reconcile_is_order_independent() {
        let granted = Intents::GUILD_MESSAGES;
        let mut forward = CapabilitySet::new(granted, CacheFlag::ALL, []);
        let mut reverse = CapabilitySet::new(granted, CacheFlag::ALL.into_iter().rev(), []);

        forward.reconcile();
        reverse.reconcile();

        assert_eq!(forward, reverse);
    }

    #[test]
    fn disabled_flag_removes_its_events_from_the_filter() {
        let mut caps = CapabilitySet::new(
            Intents::GUILDS | Intents::GUILD_PRESENCES,
            [CacheFlag::Members],
            [CacheFlag::VoiceState, CacheFlag::ScheduledEvents],
        );
        caps.reconcile();

        let filter = caps.event_types();
        assert!(!filter.contains(EventTypeFlags::VOICE_STATE_UPDATE));
        assert!(!filter.contains(EventTypeFlags::GUILD_SCHEDULED_EVENT_CREATE));
        assert!(!filter.contains(EventTypeFlags::GUILD_SCHEDULED_EVENT_USER_REMOVE));
        assert!(filter.contains(EventTypeFlags::PRESENCE_UPDATE));
        assert!(filter.contains(EventTypeFlags::INTERACTION_CREATE));
        assert!(filter.contains(EventTypeFlags::READY));
    }

    #[test]
    fn missing_presence_intent_drops_presence_updates() {
        let mut caps = CapabilitySet::new(Intents::GUILDS, [CacheFlag::Activity], []);
        caps.reconcile();

        assert!(!caps.event_types().contains(EventTypeFlags::PRESENCE_UPDATE));
    }

    #[test]
    fn shared_event_survives_while_one_owner_is_enabled() {
        let mut caps = CapabilitySet::new(
            Intents::all(),
            [CacheFlag::OnlineStatus],
            [CacheFlag::Activity, CacheFlag::ClientStatus],
        );
        caps.reconcile();

        assert!(caps.event_types().contains(EventTypeFlags::PRESENCE_UPDATE));
    }

    #[test]
    fn nothing_disabled_keeps_every_event() {
        let caps = CapabilitySet::new(Intents::all(), CacheFlag::ALL, []);
        assert_eq!(caps.event_types(), EventTypeFlags::all());
    }
}
