//! Member flag sets
//!
//! Flags are folded from every flag-contributing annotation on a member: the
//! `Flags` bitmask of the declaring annotation plus standalone annotations
//! such as `[Transient]` or `[Replicated]`.

use crate::names::{attrs, Names};
use tether_bytecode::{AttrValue, Attribute};

macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr => $label:literal,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub u64);

        impl $name {
            $($(#[$fmeta])* pub const $flag: $name = $name(1 << $bit);)*

            const LABELS: &'static [($name, &'static str)] = &[$(($name::$flag, $label),)*];

            pub const fn empty() -> Self {
                $name(0)
            }

            pub fn bits(self) -> u64 {
                self.0
            }

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn intersects(self, other: $name) -> bool {
                self.0 & other.0 != 0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Names of the set flags, in bit order
            pub fn names(self) -> Vec<&'static str> {
                Self::LABELS
                    .iter()
                    .filter(|(flag, _)| self.contains(*flag))
                    .map(|(_, label)| *label)
                    .collect()
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

flag_set! {
    /// Flags of an exposed property, field or parameter
    PropertyFlags {
        EDIT_ANYWHERE = 0 => "EditAnywhere",
        EDIT_DEFAULTS_ONLY = 1 => "EditDefaultsOnly",
        VISIBLE_ANYWHERE = 2 => "VisibleAnywhere",
        SCRIPT_READ_ONLY = 3 => "ScriptReadOnly",
        SCRIPT_READ_WRITE = 4 => "ScriptReadWrite",
        REPLICATED = 5 => "Replicated",
        REP_NOTIFY = 6 => "RepNotify",
        TRANSIENT = 7 => "Transient",
        INSTANCED = 8 => "Instanced",
        CONFIG = 9 => "Config",
        /// Function parameter
        PARAM = 10 => "Param",
        OUT_PARAM = 11 => "OutParam",
        RETURN_PARAM = 12 => "ReturnParam",
        REFERENCE_PARAM = 13 => "ReferenceParam",
        /// Subobject created with its owner
        EXPORT = 14 => "Export",
    }
}

flag_set! {
    /// Flags of an exposed function
    FunctionFlags {
        CALLABLE = 0 => "Callable",
        PURE = 1 => "Pure",
        /// Overridable from the native side; dispatch resolves per instance
        NATIVE_EVENT = 2 => "NativeEvent",
        WITH_VALIDATION = 3 => "WithValidation",
        STATIC = 4 => "Static",
        RELIABLE = 5 => "Reliable",
        SERVER = 6 => "Server",
        CLIENT = 7 => "Client",
        MULTICAST = 8 => "Multicast",
    }
}

impl PropertyFlags {
    /// Visible to the native editor
    pub const EDITOR_VISIBLE: PropertyFlags = PropertyFlags(
        PropertyFlags::EDIT_ANYWHERE.0
            | PropertyFlags::EDIT_DEFAULTS_ONLY.0
            | PropertyFlags::VISIBLE_ANYWHERE.0,
    );

    /// Readable from native scripting
    pub const SCRIPT_VISIBLE: PropertyFlags =
        PropertyFlags(PropertyFlags::SCRIPT_READ_ONLY.0 | PropertyFlags::SCRIPT_READ_WRITE.0);
}

impl FunctionFlags {
    /// Any network dispatch flag
    pub const NETWORK: FunctionFlags = FunctionFlags(
        FunctionFlags::SERVER.0 | FunctionFlags::CLIENT.0 | FunctionFlags::MULTICAST.0,
    );
}

/// Lifetime condition of a replicated member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicationCondition {
    None,
    InitialOnly,
    OwnerOnly,
    SkipOwner,
    SimulatedOnly,
    AutonomousOnly,
    SimulatedOrPhysics,
    InitialOrOwner,
    /// Decided at runtime by a named method on the owning type
    Custom,
    Never,
}

impl ReplicationCondition {
    pub fn from_i64(value: i64) -> Option<Self> {
        use ReplicationCondition::*;
        Some(match value {
            0 => None,
            1 => InitialOnly,
            2 => OwnerOnly,
            3 => SkipOwner,
            4 => SimulatedOnly,
            5 => AutonomousOnly,
            6 => SimulatedOrPhysics,
            7 => InitialOrOwner,
            8 => Custom,
            9 => Never,
            _ => return Option::None,
        })
    }

    pub fn name(self) -> &'static str {
        use ReplicationCondition::*;
        match self {
            None => "None",
            InitialOnly => "InitialOnly",
            OwnerOnly => "OwnerOnly",
            SkipOwner => "SkipOwner",
            SimulatedOnly => "SimulatedOnly",
            AutonomousOnly => "AutonomousOnly",
            SimulatedOrPhysics => "SimulatedOrPhysics",
            InitialOrOwner => "InitialOrOwner",
            Custom => "Custom",
            Never => "Never",
        }
    }
}

fn flags_arg(attr: &Attribute) -> u64 {
    attr.named_arg(attrs::ARG_FLAGS)
        .and_then(AttrValue::as_int)
        .map(|v| v as u64)
        .unwrap_or(0)
}

/// Fold every flag-contributing annotation on a member
pub fn fold_property_flags(names: &Names, attributes: &[Attribute]) -> PropertyFlags {
    let standalone = [
        (attrs::EDIT_ANYWHERE, PropertyFlags::EDIT_ANYWHERE),
        (attrs::EDIT_DEFAULTS_ONLY, PropertyFlags::EDIT_DEFAULTS_ONLY),
        (attrs::VISIBLE_ANYWHERE, PropertyFlags::VISIBLE_ANYWHERE),
        (attrs::SCRIPT_READ_ONLY, PropertyFlags::SCRIPT_READ_ONLY),
        (attrs::SCRIPT_READ_WRITE, PropertyFlags::SCRIPT_READ_WRITE),
        (attrs::REPLICATED, PropertyFlags::REPLICATED),
        (attrs::TRANSIENT, PropertyFlags::TRANSIENT),
        (attrs::INSTANCED, PropertyFlags::INSTANCED),
        (attrs::CONFIG, PropertyFlags::CONFIG),
    ];
    let property_attr = names.attr(attrs::NATIVE_PROPERTY);

    let mut flags = PropertyFlags::empty();
    for attr in attributes {
        if attr.is(&property_attr) {
            flags.insert(PropertyFlags(flags_arg(attr)));
            let using = attr
                .named_arg(attrs::ARG_REPLICATED_USING)
                .and_then(AttrValue::as_str)
                .is_some_and(|s| !s.is_empty());
            if using {
                flags.insert(PropertyFlags::REPLICATED | PropertyFlags::REP_NOTIFY);
            }
            let subobject = attr
                .named_arg(attrs::ARG_SUBOBJECT)
                .and_then(AttrValue::as_bool)
                .unwrap_or(false);
            if subobject {
                flags.insert(PropertyFlags::EXPORT | PropertyFlags::INSTANCED);
            }
            continue;
        }
        for (simple, flag) in standalone {
            if attr.is(&names.attr(simple)) {
                flags.insert(flag);
            }
        }
    }
    flags
}

/// Fold the flags of an exposed function's annotation
pub fn fold_function_flags(function_attr: &Attribute, is_static: bool) -> FunctionFlags {
    let mut flags = FunctionFlags(flags_arg(function_attr));
    if is_static {
        flags.insert(FunctionFlags::STATIC);
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingConfig;
    use tether_bytecode::TypeName;

    fn names() -> Names {
        Names::from_config(&BindingConfig::default())
    }

    fn attr(simple: &str) -> Attribute {
        Attribute::new(TypeName::new("Tether.Attributes", simple))
    }

    #[test]
    fn test_fold_combines_sources() {
        let attributes = vec![
            attr(attrs::NATIVE_PROPERTY).with_named(
                attrs::ARG_FLAGS,
                AttrValue::Int(PropertyFlags::EDIT_ANYWHERE.bits() as i64),
            ),
            attr(attrs::TRANSIENT),
        ];
        let flags = fold_property_flags(&names(), &attributes);
        assert!(flags.contains(PropertyFlags::EDIT_ANYWHERE));
        assert!(flags.contains(PropertyFlags::TRANSIENT));
        assert!(!flags.intersects(PropertyFlags::SCRIPT_VISIBLE));
        assert_eq!(flags.names(), vec!["EditAnywhere", "Transient"]);
    }

    #[test]
    fn test_replicated_using_implies_notify() {
        let attributes = vec![attr(attrs::NATIVE_PROPERTY).with_named(
            attrs::ARG_REPLICATED_USING,
            AttrValue::String("OnRep_Health".to_string()),
        )];
        let flags = fold_property_flags(&names(), &attributes);
        assert!(flags.contains(PropertyFlags::REPLICATED | PropertyFlags::REP_NOTIFY));
    }

    #[test]
    fn test_unrelated_attributes_ignored() {
        let attributes = vec![Attribute::new(TypeName::new("System", "Obsolete"))];
        assert!(fold_property_flags(&names(), &attributes).is_empty());
    }

    #[test]
    fn test_replication_condition_values() {
        assert_eq!(ReplicationCondition::from_i64(8), Some(ReplicationCondition::Custom));
        assert_eq!(ReplicationCondition::from_i64(42), None);
        assert_eq!(ReplicationCondition::SkipOwner.name(), "SkipOwner");
    }
}
