//! Constructor rewriting
//!
//! Native offsets are only usable once the base constructor has created the
//! native instance. Simple member initializers that compiled to stores before
//! the base constructor call are moved after it and turned into setter calls.
//! Anything that is not `this.X = <constant>` is rejected rather than guessed at.

use super::class::{ClassPlanner, CtorEffect};
use super::location_at;
use crate::codegen::NativeAddress;
use crate::diagnostic::{codes, Diagnostic};
use crate::error::WeaveResult;
use tether_bytecode::{BodyBuilder, Instr, InstructionList, MethodDef};

/// Instructions accepted as the value of a relocated initializer
fn is_simple_constant(instr: &Instr) -> bool {
    matches!(
        instr,
        Instr::ConstNull
            | Instr::ConstI32(_)
            | Instr::ConstI64(_)
            | Instr::ConstF32(_)
            | Instr::ConstF64(_)
            | Instr::ConstStr(_)
    )
}

impl<'p> ClassPlanner<'p, '_> {
    pub(super) fn rewrite_constructors(&mut self) -> WeaveResult<()> {
        let def = self.def;
        let construction = self.binding.construction_ctor;
        for (index, method) in def.constructors() {
            self.rewrite_constructor(index, method, Some(index) == construction)?;
        }
        Ok(())
    }

    /// Index of the call to the base (or a chained own) constructor
    fn find_base_call(&self, list: &InstructionList) -> Option<usize> {
        let base = self.def.base.as_ref();
        list.iter().position(|instr| match instr {
            Instr::Call(token) => self.source.member_ref(*token).is_some_and(|m| {
                m.is_constructor() && (Some(&m.owner) == base || m.owner == self.owner)
            }),
            _ => false,
        })
    }

    fn rewrite_constructor(
        &mut self,
        index: usize,
        method: &'p MethodDef,
        is_construction: bool,
    ) -> WeaveResult<()> {
        let Some(body) = &method.body else {
            return Ok(());
        };
        let mut list = InstructionList::decode_body(body)?;

        let stores: Vec<(usize, u32)> = list
            .iter()
            .enumerate()
            .filter_map(|(i, instr)| match instr {
                Instr::StoreField(token) if self.backing.contains_key(token) => Some((i, *token)),
                _ => None,
            })
            .collect();
        let effects: Vec<CtorEffect> = if is_construction {
            self.ctor_effects
                .iter()
                .filter(|effect| match effect {
                    CtorEffect::DefaultInit { backing, .. } => {
                        !stores.iter().any(|(_, token)| backing.contains(token))
                    }
                    CtorEffect::Subobject { .. } => true,
                })
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let touches_backing = list.iter().any(|instr| match instr {
            Instr::LoadField(t) | Instr::StoreField(t) | Instr::LoadFieldAddr(t) => {
                self.backing.contains_key(t)
            }
            _ => false,
        });
        if !touches_backing && effects.is_empty() {
            return Ok(());
        }

        let Some(base_call) = self.find_base_call(&list) else {
            self.diagnostics.push(
                Diagnostic::error(format!(
                    "constructor of '{}' has no base constructor call, so member initialization cannot be placed after it",
                    self.def.full_name()
                ))
                .with_code(codes::BASE_CTOR_CALL_NOT_FOUND)
                .at_symbol(self.def.full_name())
                .with_location(method.source.clone().or_else(|| self.def.source.clone())),
            );
            return Ok(());
        };

        // Move early initializers, last first so earlier indices stay valid
        let mut relocated: Vec<[Instr; 3]> = Vec::new();
        let mut failed = false;
        for &(i, token) in stores.iter().rev().filter(|(i, _)| *i < base_call) {
            let Some(access) = self.backing.get(&token).cloned() else {
                continue;
            };
            let Some(setter) = access.setter else {
                self.diagnostics.push(
                    Diagnostic::error(format!(
                        "initializer of '{}' runs before the base constructor call, but the value has no setter to move it to",
                        access.member
                    ))
                    .with_code(codes::UNSUPPORTED_INITIALIZER)
                    .at_symbol(self.symbol(&access.member))
                    .with_location(location_at(self.def, method, &list, i)),
                );
                failed = true;
                continue;
            };
            let shape = i.checked_sub(2).map(|start| (list.get(start), list.get(start + 1)));
            let constant = match shape {
                Some((Some(Instr::LoadArg(0)), Some(value))) if is_simple_constant(value) => {
                    value.clone()
                }
                _ => {
                    self.diagnostics.push(
                        Diagnostic::error(format!(
                            "unsupported initializer shape for '{}'",
                            access.member
                        ))
                        .with_code(codes::UNSUPPORTED_INITIALIZER)
                        .at_symbol(self.symbol(&access.member))
                        .with_location(location_at(self.def, method, &list, i))
                        .with_note("only constant initializers can be moved after the base constructor call")
                        .with_help("assign the value in the constructor body after calling the base constructor"),
                    );
                    failed = true;
                    continue;
                }
            };
            list.remove_range(i - 2, 3);
            relocated.push([Instr::LoadArg(0), constant, Instr::Call(setter)]);
        }
        if failed {
            return Ok(());
        }
        relocated.reverse();
        let base_call = base_call - 3 * relocated.len();

        self.redirect_in(method, &mut list);

        let mut injected: Vec<Instr> = relocated.into_iter().flatten().collect();
        let mut b = BodyBuilder::new();
        for effect in &effects {
            match effect {
                CtorEffect::DefaultInit {
                    category, offset, ..
                } => {
                    let addr = NativeAddress::new(self.e.this_native(), *offset);
                    self.e.emit_default_init(&mut b, category, &addr);
                }
                CtorEffect::Subobject {
                    target,
                    native_name,
                    offset,
                } => {
                    let addr = NativeAddress::new(self.e.this_native(), *offset);
                    self.e.emit_create_subobject(&mut b, target, native_name, &addr);
                }
            }
        }
        let (effects_list, _) = b.into_list()?;
        injected.extend(effects_list.as_slice().iter().cloned());

        list.insert(base_call + 1, injected);
        self.plan
            .replace_body(index, &method.name, list.encode_body(body.locals.clone()));
        Ok(())
    }
}
