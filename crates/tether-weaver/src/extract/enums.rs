//! Enum extraction

use super::{member_symbol, Extractor};
use crate::diagnostic::{codes, Diagnostic};
use crate::model::EnumBinding;
use crate::names::attrs;
use tether_bytecode::{TypeDef, TypeSig};

impl<'c, 'a> Extractor<'c, 'a> {
    pub(super) fn extract_enum(&mut self, index: usize, def: &TypeDef) -> Option<EnumBinding> {
        let mut valid = true;

        if def.enum_underlying != Some(TypeSig::U8) {
            let backing = def
                .enum_underlying
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown".to_string());
            self.report(
                Diagnostic::error(format!(
                    "enum '{}' is backed by '{}' but native enums must be backed by a byte",
                    def.full_name(),
                    backing
                ))
                .with_code(codes::ENUM_BACKING_TYPE)
                .at_symbol(def.full_name())
                .with_location(def.source.clone()),
            );
            valid = false;
        }

        let mut members = Vec::new();
        for (position, field) in def.fields.iter().filter(|f| f.is_literal()).enumerate() {
            if field.constant != Some(position as i64) {
                let found = field
                    .constant
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "no value".to_string());
                self.report(
                    Diagnostic::error(format!(
                        "enum member '{}' has value {} but must be {}",
                        field.name, found, position
                    ))
                    .with_code(codes::ENUM_SEQUENCE)
                    .at_symbol(member_symbol(def, &field.name))
                    .with_location(field.source.clone().or_else(|| def.source.clone()))
                    .with_note("native enum members must form a contiguous sequence starting at 0"),
                );
                valid = false;
            }
            members.push(field.name.clone());
        }

        if !valid {
            return None;
        }
        Some(EnumBinding {
            name: def.type_name(),
            native_name: self.ctx.names.native_type_name(def, attrs::NATIVE_ENUM),
            type_index: index,
            members,
            location: def.source.clone(),
        })
    }
}
