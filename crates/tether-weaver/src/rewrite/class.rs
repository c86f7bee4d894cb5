//! Class rewriting: property accessors, backing storage and slot population

use super::{location_at, member_slots, static_slot, TypeInitializer, TypePlan};
use crate::category::BindingCategory;
use crate::codegen::{wrapper_type, Emitter, MemberSlots, NativeAddress, ValueSource};
use crate::context::ProcessingContext;
use crate::diagnostic::{codes, Diagnostic, Diagnostics};
use crate::error::{WeaveError, WeaveResult};
use crate::model::{ClassBinding, MemberBinding, MemberOrigin};
use crate::names;
use rustc_hash::FxHashMap;
use tether_bytecode::module::{field_flags, method_flags};
use tether_bytecode::{
    Access, BodyBuilder, FieldDef, Instr, InstructionList, MemberRef, MemberRefKind, MethodDef,
    MethodSig, Module, ParamDef, TypeDef, TypeSig,
};

/// Replacement for direct access to a removed backing field
#[derive(Debug, Clone)]
pub(super) struct BackingAccess {
    pub member: String,
    pub getter: u32,
    pub setter: Option<u32>,
}

/// Work the construction constructor does once the native instance exists
#[derive(Debug, Clone)]
pub(super) enum CtorEffect {
    DefaultInit {
        category: BindingCategory,
        offset: u32,
        /// Backing field tokens; an explicit initializer cancels the effect
        backing: Vec<u32>,
    },
    Subobject {
        target: TypeSig,
        native_name: String,
        offset: u32,
    },
}

pub(super) struct ClassPlanner<'p, 'm> {
    pub ctx: &'p ProcessingContext,
    pub source: &'p Module,
    pub def: &'p TypeDef,
    pub binding: &'p ClassBinding,
    pub owner: TypeSig,
    pub e: Emitter<'m>,
    pub plan: TypePlan,
    pub init: TypeInitializer,
    pub diagnostics: Diagnostics,
    pub class_ptr: u32,
    /// Backing field token to accessor calls
    pub backing: FxHashMap<u32, BackingAccess>,
    pub ctor_effects: Vec<CtorEffect>,
}

impl<'p, 'm> ClassPlanner<'p, 'm> {
    pub fn new(
        ctx: &'p ProcessingContext,
        source: &'p Module,
        def: &'p TypeDef,
        binding: &'p ClassBinding,
        mut e: Emitter<'m>,
    ) -> Self {
        let owner = def.as_sig();
        let mut plan = TypePlan::new(binding.type_index);
        let class_ptr = static_slot(&mut e, &mut plan, &owner, names::NATIVE_CLASS_PTR, TypeSig::IntPtr);
        Self {
            ctx,
            source,
            def,
            binding,
            owner,
            e,
            plan,
            init: TypeInitializer::new(),
            diagnostics: Diagnostics::new(),
            class_ptr,
            backing: FxHashMap::default(),
            ctor_effects: Vec::new(),
        }
    }

    pub fn run(mut self) -> WeaveResult<(TypePlan, Diagnostics)> {
        self.init
            .resolve_type(&mut self.e, self.class_ptr, &self.binding.native_name);

        let binding = self.binding;
        for member in &binding.members {
            self.rewrite_property(member)?;
        }
        self.rewrite_constructors()?;
        self.redirect_backing_access()?;
        for function in &binding.functions {
            self.rewrite_function(function)?;
        }

        let mut plan = self.plan;
        plan.initializer = self.init.finish()?;
        if !plan.initializer.is_empty() {
            plan.touch(tether_bytecode::module::TYPE_INITIALIZER_NAME);
        }
        Ok((plan, self.diagnostics))
    }

    pub(super) fn symbol(&self, member: &str) -> String {
        format!("{}::{}", self.def.full_name(), member)
    }

    fn method(&self, index: usize) -> WeaveResult<&'p MethodDef> {
        let def: &'p TypeDef = self.def;
        def.methods.get(index).ok_or_else(|| {
            WeaveError::Inconsistent(format!(
                "method index {} out of range on '{}'",
                index,
                def.full_name()
            ))
        })
    }

    fn rewrite_property(&mut self, member: &MemberBinding) -> WeaveResult<()> {
        let MemberOrigin::Property(index) = member.origin else {
            return Ok(());
        };
        let def = self.def;
        let property = def.properties.get(index).ok_or_else(|| {
            WeaveError::Inconsistent(format!("property '{}' moved during rewriting", member.name))
        })?;
        let getter_index = property.getter.ok_or_else(|| {
            WeaveError::Inconsistent(format!("property '{}' lost its getter", member.name))
        })? as usize;
        let category = &member.category;
        let ty = member.value_type();

        let mut slots = member_slots(&mut self.e, &mut self.plan, &self.owner, &member.name, category);
        if let Some(wrapper_ty) = wrapper_type(self.e.refs(), category) {
            let name = names::wrapper_field(&member.name);
            let mut field = FieldDef::new(&name, wrapper_ty.clone());
            field.flags = field_flags::COMPILER_GENERATED;
            self.plan.fields.push(field);
            slots.wrapper = Some(self.e.member(MemberRef::field(self.owner.clone(), &name, wrapper_ty)));
        }
        self.init
            .member(&mut self.e, self.class_ptr, &member.native_name, &slots);

        let base = self.e.this_native();
        let addr = NativeAddress::new(base, slots.offset);

        // Getter
        let getter = self.method(getter_index)?;
        let mut b = BodyBuilder::new();
        self.e.emit_liveness_check(&mut b);
        self.e.emit_load(&mut b, category, ty, &slots, &addr)?;
        b.ret();
        self.plan.replace_body(getter_index, &getter.name, b.build()?);
        let getter_ref = self.e.member(MemberRef::method(
            self.owner.clone(),
            &getter.name,
            MethodSig::instance(vec![], ty.clone()),
        ));

        // Setter
        let backing_name = names::backing_field(&member.name);
        let backing_tokens = self.field_tokens(&backing_name);
        let setter_ref = if category.suppresses_setter() {
            if let Some(setter_index) = property.setter {
                let setter = self.method(setter_index as usize)?;
                self.check_setter_unreferenced(member, setter)?;
                self.plan.remove_methods.push(setter_index as usize);
            }
            None
        } else {
            let body = self.setter_body(category, ty, &slots, &addr)?;
            let name = match property.setter {
                Some(setter_index) => {
                    let setter = self.method(setter_index as usize)?;
                    self.plan.replace_body(setter_index as usize, &setter.name, body);
                    Some(setter.name.clone())
                }
                None if self.is_stored(&backing_tokens)? => {
                    // Initializers of get-only properties still need a native write
                    let name = names::setter(&member.name);
                    let mut method = MethodDef::new(
                        &name,
                        vec![ParamDef::new("value", ty.clone())],
                        TypeSig::Void,
                    );
                    method.access = Access::Private;
                    method.flags = method_flags::SPECIAL_NAME | method_flags::COMPILER_GENERATED;
                    method.body = Some(body);
                    self.plan.add_method(method);
                    Some(name)
                }
                None => None,
            };
            name.map(|name| {
                self.e.member(MemberRef::method(
                    self.owner.clone(),
                    &name,
                    MethodSig::instance(vec![ty.clone()], TypeSig::Void),
                ))
            })
        };

        if def.find_field(&backing_name).is_some() {
            self.plan.remove_fields.push(backing_name);
        }
        for token in &backing_tokens {
            self.backing.insert(
                *token,
                BackingAccess {
                    member: member.name.clone(),
                    getter: getter_ref,
                    setter: setter_ref,
                },
            );
        }

        if category.needs_default_init() {
            self.ctor_effects.push(CtorEffect::DefaultInit {
                category: category.clone(),
                offset: slots.offset,
                backing: backing_tokens,
            });
        }
        if let BindingCategory::SubobjectReference { target } = category {
            self.ctor_effects.push(CtorEffect::Subobject {
                target: target.clone(),
                native_name: member.native_name.clone(),
                offset: slots.offset,
            });
        }
        Ok(())
    }

    fn setter_body(
        &mut self,
        category: &BindingCategory,
        ty: &TypeSig,
        slots: &MemberSlots,
        addr: &NativeAddress,
    ) -> WeaveResult<tether_bytecode::MethodBody> {
        let mut b = BodyBuilder::new();
        self.e.emit_liveness_check(&mut b);
        self.e
            .emit_store(&mut b, category, ty, slots, addr, ValueSource::Arg(1))?;
        b.ret();
        Ok(b.build()?)
    }

    /// Tokens of every reference to an instance field of this class
    pub(super) fn field_tokens(&self, name: &str) -> Vec<u32> {
        self.source
            .member_refs
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                m.owner == self.owner
                    && m.name == name
                    && matches!(m.kind, MemberRefKind::Field { is_static: false, .. })
            })
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Check whether any method of the class stores to one of `tokens`
    fn is_stored(&self, tokens: &[u32]) -> WeaveResult<bool> {
        if tokens.is_empty() {
            return Ok(false);
        }
        for method in &self.def.methods {
            let Some(body) = &method.body else { continue };
            let list = InstructionList::decode_body(body)?;
            if list
                .iter()
                .any(|i| matches!(i, Instr::StoreField(t) if tokens.contains(t)))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A removed setter must not be called from anywhere in the module
    fn check_setter_unreferenced(
        &mut self,
        member: &MemberBinding,
        setter: &MethodDef,
    ) -> WeaveResult<()> {
        let tokens: Vec<u32> = self
            .source
            .member_refs
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                m.owner == self.owner
                    && m.name == setter.name
                    && matches!(m.kind, MemberRefKind::Method(_))
            })
            .map(|(i, _)| i as u32)
            .collect();
        if tokens.is_empty() {
            return Ok(());
        }

        let source = self.source;
        for ty in &source.types {
            for method in &ty.methods {
                if ty.full_name() == self.def.full_name() && method.name == setter.name {
                    continue;
                }
                let Some(body) = &method.body else { continue };
                let list = InstructionList::decode_body(body)?;
                for (index, instr) in list.iter().enumerate() {
                    let calls = matches!(instr, Instr::Call(t) | Instr::CallVirt(t) if tokens.contains(t));
                    if calls {
                        self.diagnostics.push(
                            Diagnostic::error(format!(
                                "setter of '{}' is removed because the value is mutated through its wrapper, but '{}::{}' still calls it",
                                member.name,
                                ty.full_name(),
                                method.name
                            ))
                            .with_code(codes::SETTER_STILL_REFERENCED)
                            .at_symbol(self.symbol(&member.name))
                            .with_location(location_at(ty, method, &list, index)),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Route remaining backing-field access in ordinary methods through accessors
    fn redirect_backing_access(&mut self) -> WeaveResult<()> {
        if self.backing.is_empty() {
            return Ok(());
        }
        let def = self.def;
        for (index, method) in def.methods.iter().enumerate() {
            if method.is_constructor() || self.plan.has_body(index) || self.plan.remove_methods.contains(&index) {
                continue;
            }
            let Some(body) = &method.body else { continue };
            let mut list = InstructionList::decode_body(body)?;
            if self.redirect_in(method, &mut list) {
                self.plan
                    .replace_body(index, &method.name, list.encode_body(body.locals.clone()));
            }
        }
        Ok(())
    }

    /// Replace backing-field instructions in `list`; returns whether anything changed
    pub(super) fn redirect_in(&mut self, method: &MethodDef, list: &mut InstructionList) -> bool {
        let mut changed = false;
        for index in 0..list.len() {
            let replacement = match list.get(index) {
                Some(Instr::LoadField(t)) => match self.backing.get(t) {
                    Some(access) => Instr::Call(access.getter),
                    None => continue,
                },
                Some(Instr::StoreField(t)) => match self.backing.get(t) {
                    Some(BackingAccess {
                        setter: Some(setter),
                        ..
                    }) => Instr::Call(*setter),
                    Some(access) => {
                        let diagnostic = Diagnostic::error(format!(
                            "'{}' assigns the storage of '{}', which has no setter after rewriting",
                            method.name, access.member
                        ))
                        .with_code(codes::SETTER_STILL_REFERENCED)
                        .at_symbol(self.symbol(&access.member))
                        .with_location(location_at(self.def, method, list, index));
                        self.diagnostics.push(diagnostic);
                        continue;
                    }
                    None => continue,
                },
                Some(Instr::LoadFieldAddr(t)) => match self.backing.get(t) {
                    Some(access) => {
                        let diagnostic = Diagnostic::error(format!(
                            "'{}' takes the address of the storage of '{}', which moves to native memory",
                            method.name, access.member
                        ))
                        .with_code(codes::BACKING_FIELD_ADDRESS)
                        .at_symbol(self.symbol(&access.member))
                        .with_location(location_at(self.def, method, list, index));
                        self.diagnostics.push(diagnostic);
                        continue;
                    }
                    None => continue,
                },
                _ => continue,
            };
            list.replace(index, vec![replacement]);
            changed = true;
        }
        changed
    }
}
