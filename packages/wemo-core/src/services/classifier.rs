//! Capability classification from the raw UPnP device type.
//!
//! A fixed designator table is matched case-insensitively against the
//! device type string. Designators belong to a family (switch or motion);
//! matches within one family are unioned, matches across families are
//! rejected as contradictory.

use serde::{Serialize, Serializer};

use crate::utils::contains_ignore_ascii_case;

/// A behavior an appliance supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    /// Relay that can be switched on and off.
    Switchable,
    /// Reports instantaneous power draw.
    PowerMetered,
    /// Reports motion presence.
    MotionSensing,
}

impl Capability {
    const ALL: [Capability; 3] = [
        Capability::Switchable,
        Capability::PowerMetered,
        Capability::MotionSensing,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::Switchable => 1,
            Self::PowerMetered => 1 << 1,
            Self::MotionSensing => 1 << 2,
        }
    }
}

/// Set of [`Capability`] values, iterated in declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds a set from a slice of capabilities.
    #[must_use]
    pub fn of(capabilities: &[Capability]) -> Self {
        capabilities
            .iter()
            .fold(Self::empty(), |set, &c| set.with(c))
    }

    /// Returns a copy of this set with `capability` added.
    #[must_use]
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of capabilities in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Presentation class passed through to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ThingType {
    Socket,
    Switch,
    Motion,
}

impl ThingType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Switch => "switch",
            Self::Motion => "motion",
        }
    }

    /// Product type reported in the bus signatures.
    #[must_use]
    pub fn product_type(&self) -> &'static str {
        match self {
            Self::Socket | Self::Switch => "Switch",
            Self::Motion => "Motion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Switch,
    Motion,
}

struct Designator {
    pattern: &'static str,
    capabilities: CapabilitySet,
    family: Family,
    thing_type: ThingType,
}

/// Designators in match-priority order; the first match picks the thing type.
const DESIGNATORS: &[Designator] = &[
    Designator {
        pattern: "controllee",
        capabilities: CapabilitySet::empty().with(Capability::Switchable),
        family: Family::Switch,
        thing_type: ThingType::Socket,
    },
    Designator {
        pattern: "lightswitch",
        capabilities: CapabilitySet::empty().with(Capability::Switchable),
        family: Family::Switch,
        thing_type: ThingType::Switch,
    },
    Designator {
        pattern: "insight",
        capabilities: CapabilitySet::empty()
            .with(Capability::Switchable)
            .with(Capability::PowerMetered),
        family: Family::Switch,
        thing_type: ThingType::Socket,
    },
    Designator {
        pattern: "sensor",
        capabilities: CapabilitySet::empty().with(Capability::MotionSensing),
        family: Family::Motion,
        thing_type: ThingType::Motion,
    },
];

/// Outcome of classifying one raw device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// At least one designator matched; the set is never empty.
    Supported {
        capabilities: CapabilitySet,
        thing_type: ThingType,
    },
    /// No designator matched.
    Unsupported,
    /// Designators from incompatible families matched.
    Contradictory,
}

impl Classification {
    /// The classified capabilities; empty unless [`Classification::Supported`].
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        match self {
            Self::Supported { capabilities, .. } => *capabilities,
            Self::Unsupported | Self::Contradictory => CapabilitySet::empty(),
        }
    }
}

/// Classifies a raw device type such as `urn:Belkin:device:insight:1`.
pub fn classify(raw_type: &str) -> Classification {
    let mut capabilities = CapabilitySet::empty();
    let mut family = None;
    let mut thing_type = None;

    for designator in DESIGNATORS
        .iter()
        .filter(|d| contains_ignore_ascii_case(raw_type, d.pattern))
    {
        match family {
            Some(f) if f != designator.family => return Classification::Contradictory,
            _ => family = Some(designator.family),
        }
        capabilities = capabilities.union(designator.capabilities);
        thing_type.get_or_insert(designator.thing_type);
    }

    match thing_type {
        Some(thing_type) => Classification::Supported {
            capabilities,
            thing_type,
        },
        None => Classification::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supported(raw: &str) -> (CapabilitySet, ThingType) {
        match classify(raw) {
            Classification::Supported {
                capabilities,
                thing_type,
            } => (capabilities, thing_type),
            other => panic!("{raw} classified as {other:?}"),
        }
    }

    #[test]
    fn controllee_is_switchable_socket() {
        let (caps, thing) = supported("Belkin.Controllee");
        assert_eq!(caps, CapabilitySet::of(&[Capability::Switchable]));
        assert_eq!(thing, ThingType::Socket);

        let (caps, _) = supported("urn:Belkin:device:controllee:1");
        assert!(caps.contains(Capability::Switchable));
    }

    #[test]
    fn insight_is_switchable_and_metered() {
        let (caps, thing) = supported("Belkin.Insight");
        assert!(caps.contains(Capability::Switchable));
        assert!(caps.contains(Capability::PowerMetered));
        assert!(!caps.contains(Capability::MotionSensing));
        assert_eq!(caps.len(), 2);
        assert_eq!(thing, ThingType::Socket);
    }

    #[test]
    fn lightswitch_is_switch_thing() {
        let (caps, thing) = supported("urn:Belkin:device:lightswitch:1");
        assert_eq!(caps, CapabilitySet::of(&[Capability::Switchable]));
        assert_eq!(thing, ThingType::Switch);
    }

    #[test]
    fn sensor_is_motion() {
        let (caps, thing) = supported("Belkin.Sensor");
        assert_eq!(caps, CapabilitySet::of(&[Capability::MotionSensing]));
        assert_eq!(thing, ThingType::Motion);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(supported("URN:BELKIN:DEVICE:INSIGHT:1").0.len(), 2);
        assert_eq!(supported("belkin.sensor").1, ThingType::Motion);
    }

    #[test]
    fn unknown_types_are_unsupported() {
        assert_eq!(classify("urn:Belkin:device:bridge:1"), Classification::Unsupported);
        assert_eq!(classify(""), Classification::Unsupported);
        assert!(classify("urn:Belkin:device:Maker:1").capabilities().is_empty());
    }

    #[test]
    fn switch_and_motion_together_are_contradictory() {
        assert_eq!(classify("Belkin.Controllee.Sensor"), Classification::Contradictory);
        assert_eq!(classify("insight-sensor"), Classification::Contradictory);
        assert!(classify("insight-sensor").capabilities().is_empty());
    }

    #[test]
    fn every_switch_designator_without_motion_yields_switchable() {
        for raw in ["controllee", "lightswitch", "insight", "x-CONTROLLEE-y"] {
            assert!(classify(raw).capabilities().contains(Capability::Switchable), "{raw}");
        }
    }

    #[test]
    fn capability_set_serializes_as_list() {
        let json = serde_json::to_value(supported("Belkin.Insight").0).unwrap();
        assert_eq!(json, serde_json::json!(["switchable", "powerMetered"]));
    }
}
