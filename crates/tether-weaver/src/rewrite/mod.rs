//! Instruction-stream rewriting
//!
//! The rewriter works on a copy of the input module. Each annotated type is
//! planned in isolation: new slots, replacement bodies, synthesized methods and
//! removals are collected in a [`TypePlan`] while the original type is only
//! read. A plan is committed in one step and every body it touched is verified
//! afterwards. Validation problems found while planning are accumulated; any of
//! them causes the whole rewritten copy to be discarded by the caller.

mod class;
mod constructor;
mod function;
mod structs;

use crate::codegen::{Emitter, MemberSlots};
use crate::category::BindingCategory;
use crate::context::ProcessingContext;
use crate::diagnostic::Diagnostics;
use crate::error::{WeaveError, WeaveResult};
use crate::model::{ClassBinding, ModuleBindings, StructBinding};
use crate::names::{self, Names};
use crate::runtime::{LayoutQuery, RuntimeRefs};
use tether_bytecode::module::{field_flags, method_flags, TYPE_INITIALIZER_NAME};
use tether_bytecode::{
    verify_method, Access, Attribute, BodyBuilder, FieldDef, Instr, InstructionList, MemberRef,
    MethodBody, MethodDef, Module, SourceLocation, TypeDef, TypeSig,
};
use tracing::debug;

/// Edits to one type, applied together
#[derive(Debug, Default)]
pub(crate) struct TypePlan {
    type_index: usize,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    /// Replacement bodies by method index
    bodies: Vec<(usize, MethodBody)>,
    /// New names by method index; renamed methods lose their attributes
    renames: Vec<(usize, String)>,
    remove_methods: Vec<usize>,
    remove_fields: Vec<String>,
    attributes: Vec<Attribute>,
    /// Prepended to the type initializer
    initializer: Vec<Instr>,
    /// Methods to verify after commit
    touched: Vec<String>,
}

impl TypePlan {
    fn new(type_index: usize) -> Self {
        Self {
            type_index,
            ..Self::default()
        }
    }

    fn replace_body(&mut self, index: usize, name: &str, body: MethodBody) {
        self.bodies.retain(|(i, _)| *i != index);
        self.bodies.push((index, body));
        self.touch(name);
    }

    fn add_method(&mut self, method: MethodDef) {
        self.touch(&method.name);
        self.methods.push(method);
    }

    fn touch(&mut self, name: &str) {
        if !self.touched.iter().any(|n| n == name) {
            self.touched.push(name.to_string());
        }
    }

    fn has_body(&self, index: usize) -> bool {
        self.bodies.iter().any(|(i, _)| *i == index)
    }
}

/// Allocate a static slot field and return its token
pub(crate) fn static_slot(
    e: &mut Emitter<'_>,
    plan: &mut TypePlan,
    owner: &TypeSig,
    name: &str,
    ty: TypeSig,
) -> u32 {
    let mut field = FieldDef::new(name, ty.clone());
    field.flags = field_flags::STATIC | field_flags::COMPILER_GENERATED;
    plan.fields.push(field);
    e.member(MemberRef::static_field(owner.clone(), name, ty))
}

/// Allocate the offset slot and whatever extra slots a category needs
pub(crate) fn member_slots(
    e: &mut Emitter<'_>,
    plan: &mut TypePlan,
    owner: &TypeSig,
    prefix: &str,
    category: &BindingCategory,
) -> MemberSlots {
    let mut slots = MemberSlots {
        offset: static_slot(e, plan, owner, &names::offset_slot(prefix), TypeSig::I32),
        ..MemberSlots::default()
    };
    if category.needs_property_handle() {
        slots.handle = Some(static_slot(e, plan, owner, &names::handle_slot(prefix), TypeSig::IntPtr));
    }
    if category.needs_element_size() {
        slots.element_size = Some(static_slot(
            e,
            plan,
            owner,
            &names::element_size_slot(prefix),
            TypeSig::I32,
        ));
    }
    if category.needs_width() {
        slots.width = Some(static_slot(e, plan, owner, &names::width_slot(prefix), TypeSig::I32));
    }
    slots
}

/// Builds the slot-population prelude of a type initializer
#[derive(Debug, Default)]
pub(crate) struct TypeInitializer {
    b: BodyBuilder,
}

impl TypeInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `class_ptr = ResolveNativeType(native_name)`
    pub fn resolve_type(&mut self, e: &mut Emitter<'_>, class_ptr: u32, native_name: &str) {
        let query = e.refs().layout(e.module(), LayoutQuery::NativeType);
        e.emit_load_string(&mut self.b, native_name);
        self.b.call(query);
        self.b.store_static(class_ptr);
    }

    /// `size_slot = GetStructSize(class_ptr)`
    pub fn struct_size(&mut self, e: &mut Emitter<'_>, class_ptr: u32, size_slot: u32) {
        let query = e.refs().layout(e.module(), LayoutQuery::StructSize);
        self.b.load_static(class_ptr);
        self.b.call(query);
        self.b.store_static(size_slot);
    }

    /// Populate a member's slots from its owner handle (a type or a function)
    pub fn member(
        &mut self,
        e: &mut Emitter<'_>,
        owner_handle: u32,
        native_name: &str,
        slots: &MemberSlots,
    ) {
        self.query(e, LayoutQuery::PropertyOffset, owner_handle, native_name, slots.offset);
        if let Some(handle) = slots.handle {
            self.query(e, LayoutQuery::PropertyHandle, owner_handle, native_name, handle);
        }
        if let Some(size) = slots.element_size {
            self.query(e, LayoutQuery::ArrayElementSize, owner_handle, native_name, size);
        }
        if let Some(width) = slots.width {
            let query = e.refs().layout(e.module(), LayoutQuery::BooleanStorageWidth);
            self.b.call(query);
            self.b.store_static(width);
        }
    }

    /// Resolve a function handle and its argument buffer size
    pub fn function(
        &mut self,
        e: &mut Emitter<'_>,
        class_ptr: u32,
        native_name: &str,
        function_slot: u32,
        size_slot: u32,
    ) {
        self.query(e, LayoutQuery::FunctionHandle, class_ptr, native_name, function_slot);
        let query = e.refs().layout(e.module(), LayoutQuery::FunctionArgumentsSize);
        self.b.load_static(function_slot);
        self.b.call(query);
        self.b.store_static(size_slot);
    }

    fn query(
        &mut self,
        e: &mut Emitter<'_>,
        query: LayoutQuery,
        owner_handle: u32,
        native_name: &str,
        target: u32,
    ) {
        let token = e.refs().layout(e.module(), query);
        self.b.load_static(owner_handle);
        e.emit_load_string(&mut self.b, native_name);
        self.b.call(token);
        self.b.store_static(target);
    }

    pub fn finish(self) -> WeaveResult<Vec<Instr>> {
        let (list, _) = self.b.into_list()?;
        Ok(list.as_slice().to_vec())
    }
}

/// Location of an instruction, falling back to the method then the type
pub(crate) fn location_at(
    def: &TypeDef,
    method: &MethodDef,
    list: &InstructionList,
    index: usize,
) -> Option<SourceLocation> {
    let fallback = method.source.clone().or_else(|| def.source.clone());
    match (list.line_at(index), &fallback) {
        (Some((line, column)), Some(source)) => {
            Some(SourceLocation::new(source.file.clone(), line, column))
        }
        _ => fallback,
    }
}

/// Rewritten module and the problems found while planning it
#[derive(Debug)]
pub struct RewriteOutput {
    pub module: Module,
    pub diagnostics: Diagnostics,
}

/// Rewrites annotated types of one module in dependency order
pub struct Rewriter<'a> {
    ctx: &'a ProcessingContext,
    source: &'a Module,
    module: Module,
    refs: RuntimeRefs,
    diagnostics: Diagnostics,
}

impl<'a> Rewriter<'a> {
    /// Prepare a rewrite, checking that the runtime collaborators exist
    pub fn new(
        ctx: &'a ProcessingContext,
        source: &'a Module,
        bindings: &ModuleBindings,
    ) -> WeaveResult<Self> {
        let needs_runtime =
            bindings.classes().next().is_some() || bindings.structs().any(|s| !s.blittable);
        let refs = if needs_runtime {
            let categories = bindings
                .classes()
                .flat_map(|c| {
                    c.members
                        .iter()
                        .chain(c.functions.iter().flat_map(|f| f.all_values()))
                })
                .chain(bindings.structs().flat_map(|s| s.members.iter()))
                .map(|m| &m.category);
            RuntimeRefs::resolve(ctx, source, categories)?
        } else {
            RuntimeRefs::unchecked(&ctx.names)
        };
        Ok(Self {
            ctx,
            source,
            module: source.clone(),
            refs,
            diagnostics: Diagnostics::new(),
        })
    }

    fn names(&self) -> &Names {
        &self.ctx.names
    }

    /// Rewrite one struct
    pub fn rewrite_struct(&mut self, binding: &StructBinding) -> WeaveResult<()> {
        let def = self.type_def(binding.type_index, &binding.name.full_name())?;
        let plan = if binding.blittable {
            let mut plan = TypePlan::new(binding.type_index);
            let name = self.names().attr(crate::names::attrs::BLITTABLE);
            plan.attributes
                .push(Attribute::new(tether_bytecode::TypeName::parse(&name)));
            plan
        } else if self.ctx.is_core_struct(&binding.name) {
            debug!(ty = %binding.name, "core struct keeps its runtime marshaller");
            return Ok(());
        } else {
            let emitter = Emitter::new(&mut self.module, &self.refs);
            structs::plan_struct(def, binding, emitter)?
        };
        self.commit(plan)
    }

    /// Rewrite one class; its in-module base class must already be rewritten
    pub fn rewrite_class(&mut self, binding: &ClassBinding) -> WeaveResult<()> {
        let def = self.type_def(binding.type_index, &binding.name.full_name())?;
        let emitter = Emitter::new(&mut self.module, &self.refs);
        let planner = class::ClassPlanner::new(self.ctx, self.source, def, binding, emitter);
        let (plan, diagnostics) = planner.run()?;
        let failed = diagnostics.has_errors();
        self.diagnostics.extend(diagnostics.into_vec());
        if failed {
            // The module will be rejected; skip committing a partial plan
            return Ok(());
        }
        self.commit(plan)
    }

    pub fn finish(self) -> RewriteOutput {
        RewriteOutput {
            module: self.module,
            diagnostics: self.diagnostics,
        }
    }

    fn type_def(&self, index: usize, name: &str) -> WeaveResult<&'a TypeDef> {
        let source: &'a Module = self.source;
        source
            .types
            .get(index)
            .filter(|t| t.full_name() == name)
            .ok_or_else(|| WeaveError::Inconsistent(format!("type '{}' moved during rewriting", name)))
    }

    fn commit(&mut self, plan: TypePlan) -> WeaveResult<()> {
        let TypePlan {
            type_index,
            fields,
            methods,
            bodies,
            renames,
            mut remove_methods,
            remove_fields,
            attributes,
            initializer,
            touched,
        } = plan;

        let def = self
            .module
            .types
            .get_mut(type_index)
            .ok_or_else(|| WeaveError::Inconsistent(format!("type index {} out of range", type_index)))?;

        def.fields.extend(fields);
        def.attributes.extend(attributes);
        for (index, body) in bodies {
            let method = def.methods.get_mut(index).ok_or_else(|| {
                WeaveError::Inconsistent(format!("method index {} out of range", index))
            })?;
            method.body = Some(body);
        }
        for (index, name) in renames {
            if let Some(method) = def.methods.get_mut(index) {
                method.name = name;
                method.attributes.clear();
            }
        }
        def.methods.extend(methods);
        install_initializer(def, initializer)?;

        remove_methods.sort_unstable();
        remove_methods.dedup();
        for index in remove_methods.into_iter().rev() {
            def.remove_method(index);
        }
        def.fields.retain(|f| !remove_fields.contains(&f.name));

        let def = &self.module.types[type_index];
        for method in def.methods.iter().filter(|m| touched.contains(&m.name)) {
            verify_method(&self.module, method).map_err(|source| WeaveError::Verification {
                method: format!("{}::{}", def.full_name(), method.name),
                source,
            })?;
        }
        debug!(ty = %def.full_name(), methods = touched.len(), "committed rewrite");
        Ok(())
    }
}

/// Prepend slot population to the type initializer, creating one if needed
fn install_initializer(def: &mut TypeDef, prelude: Vec<Instr>) -> WeaveResult<()> {
    if prelude.is_empty() {
        return Ok(());
    }
    match def.type_initializer() {
        Some(index) => {
            let method = &mut def.methods[index];
            let body = method.body.take().unwrap_or_default();
            let mut list = InstructionList::decode_body(&body)?;
            list.insert(0, prelude);
            method.body = Some(list.encode_body(body.locals));
        }
        None => {
            let mut method = MethodDef::new(TYPE_INITIALIZER_NAME, vec![], TypeSig::Void);
            method.access = Access::Private;
            method.flags = method_flags::STATIC | method_flags::SPECIAL_NAME;
            let mut list = InstructionList::from_instrs(prelude);
            list.push(Instr::Ret);
            method.body = Some(list.encode_body(vec![]));
            def.add_method(method);
        }
    }
    Ok(())
}
