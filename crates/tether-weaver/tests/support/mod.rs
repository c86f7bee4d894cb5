//! Shared fixtures for weaver integration tests
//!
//! Modules are assembled programmatically: a runtime module with the support
//! types generated code refers to, and game modules built with [`GameModule`].

#![allow(dead_code)]

pub mod eval;

use tether_bytecode::module::{field_flags, method_flags, CONSTRUCTOR_NAME};
use tether_bytecode::{
    AttrValue, Attribute, BodyBuilder, FieldDef, Instr, MemberRef, MethodDef, MethodSig, Module,
    ParamDef, PropertyDef, TypeDef, TypeKind, TypeName, TypeSig,
};
use tether_weaver::{
    NativeManifest, ProcessingContext, TypeUniverse, WeaveOutcome, Weaver, WeaverConfig,
    WovenModule,
};

pub const ATTRS: &str = "Tether.Attributes";
pub const RUNTIME: &str = "Tether.Runtime";
pub const GAME: &str = "Game";

pub fn attr(simple: &str) -> Attribute {
    Attribute::new(TypeName::new(ATTRS, simple))
}

pub fn root() -> TypeSig {
    TypeSig::named(RUNTIME, "NativeObject")
}

pub fn game(name: &str) -> TypeSig {
    TypeSig::named(GAME, name)
}

/// Runtime support module resolved through the search paths
pub fn runtime_module() -> Module {
    let mut module = Module::new(RUNTIME);
    let classes = [
        "NativeObject",
        "NativeLayout",
        "BoolMarshaller",
        "StringMarshaller",
        "Text",
        "TextMarshaller",
        "ObjectMarshaller",
        "WeakRef",
        "WeakRefMarshaller",
        "SubclassOf",
        "SubclassOfMarshaller",
        "FixedArray",
        "NativeList",
        "ListMarshaller",
    ];
    for name in classes {
        module.types.push(TypeDef::new(RUNTIME, name, TypeKind::Class));
    }
    module
}

pub fn context() -> ProcessingContext {
    context_with(NativeManifest::default())
}

pub fn context_with(manifest: NativeManifest) -> ProcessingContext {
    ProcessingContext::new(
        WeaverConfig::default(),
        manifest,
        TypeUniverse::from_modules(vec![runtime_module()]),
    )
}

/// Context whose search paths also hold `libraries`
pub fn context_with_libraries(libraries: Vec<Module>) -> ProcessingContext {
    let mut modules = vec![runtime_module()];
    modules.extend(libraries);
    ProcessingContext::new(
        WeaverConfig::default(),
        NativeManifest::default(),
        TypeUniverse::from_modules(modules),
    )
}

/// Weave and expect a rewritten module
pub fn weave_ok(ctx: &ProcessingContext, module: &Module) -> WovenModule {
    match Weaver::new(ctx).weave(module).unwrap() {
        WeaveOutcome::Rewritten(woven) => woven,
        WeaveOutcome::Rejected(diagnostics) => {
            let rendered: Vec<String> = diagnostics.iter().map(|d| d.render()).collect();
            panic!("module rejected:\n{}", rendered.join("\n"))
        }
        WeaveOutcome::NoBindings => panic!("no bindings found"),
    }
}

/// Property declaration for [`ClassFixture::property`]
pub struct Prop {
    pub name: &'static str,
    pub ty: TypeSig,
    pub annotation: Attribute,
    pub extra: Vec<Attribute>,
    pub setter: bool,
}

impl Prop {
    pub fn new(name: &'static str, ty: TypeSig) -> Self {
        Self {
            name,
            ty,
            annotation: attr("NativeProperty"),
            extra: Vec::new(),
            setter: true,
        }
    }

    pub fn named(mut self, key: &str, value: AttrValue) -> Self {
        self.annotation = self.annotation.with_named(key, value);
        self
    }

    pub fn with(mut self, attribute: Attribute) -> Self {
        self.extra.push(attribute);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.setter = false;
        self
    }
}

/// Builder for a game module
pub struct GameModule {
    pub module: Module,
}

impl GameModule {
    pub fn new() -> Self {
        Self {
            module: Module::new(GAME),
        }
    }

    pub fn build(self) -> Module {
        self.module
    }

    /// Annotated byte enum with explicit member values
    pub fn enumeration(&mut self, name: &str, members: &[(&str, i64)]) -> &mut TypeDef {
        let mut def = TypeDef::new(GAME, name, TypeKind::Enum);
        def.enum_underlying = Some(TypeSig::U8);
        def.attributes.push(attr("NativeEnum"));
        for (member, value) in members {
            let mut field = FieldDef::new(member, game(name));
            field.flags = field_flags::STATIC | field_flags::LITERAL;
            field.constant = Some(*value);
            def.fields.push(field);
        }
        self.module.types.push(def);
        self.module.types.last_mut().unwrap()
    }

    /// Annotated struct whose fields are all exposed
    pub fn structure(&mut self, name: &str, fields: &[(&str, TypeSig)]) -> &mut TypeDef {
        let mut def = TypeDef::new(GAME, name, TypeKind::Struct);
        def.attributes.push(attr("NativeStruct"));
        for (field, ty) in fields {
            let mut field = FieldDef::new(field, ty.clone());
            field.access = tether_bytecode::Access::Public;
            field.attributes.push(attr("NativeProperty"));
            def.fields.push(field);
        }
        self.module.types.push(def);
        self.module.types.last_mut().unwrap()
    }

    /// Annotated class with both required constructors
    pub fn class(&mut self, name: &str, base: TypeSig) -> ClassFixture<'_> {
        let mut fixture = self.bare_class(name, base);
        fixture.construction_ctor();
        fixture.rehydration_ctor();
        fixture
    }

    /// Annotated class without constructors
    pub fn bare_class(&mut self, name: &str, base: TypeSig) -> ClassFixture<'_> {
        let mut def = TypeDef::new(GAME, name, TypeKind::Class);
        def.base = Some(base);
        def.attributes.push(attr("NativeClass"));
        self.module.types.push(def);
        let index = self.module.types.len() - 1;
        ClassFixture {
            module: &mut self.module,
            index,
        }
    }
}

impl Default for GameModule {
    fn default() -> Self {
        Self::new()
    }
}

/// Adds members to a class under construction
pub struct ClassFixture<'m> {
    module: &'m mut Module,
    index: usize,
}

impl ClassFixture<'_> {
    pub fn def(&mut self) -> &mut TypeDef {
        &mut self.module.types[self.index]
    }

    fn sig(&self) -> TypeSig {
        self.module.types[self.index].as_sig()
    }

    fn base(&self) -> TypeSig {
        self.module.types[self.index].base.clone().unwrap()
    }

    /// Token of the base constructor with the given parameters
    pub fn base_ctor(&mut self, params: Vec<TypeSig>) -> u32 {
        let base = self.base();
        self.module.intern_member_ref(MemberRef::method(
            base,
            CONSTRUCTOR_NAME,
            MethodSig::instance(params, TypeSig::Void),
        ))
    }

    /// Token of an instance field of this class
    pub fn field_ref(&mut self, name: &str, ty: TypeSig) -> u32 {
        let owner = self.sig();
        self.module
            .intern_member_ref(MemberRef::field(owner, name, ty))
    }

    /// Token of a method of this class
    pub fn method_ref(&mut self, name: &str, sig: MethodSig) -> u32 {
        let owner = self.sig();
        self.module.intern_member_ref(MemberRef::method(owner, name, sig))
    }

    pub fn string(&mut self, value: &str) -> u32 {
        self.module.intern_string(value)
    }

    /// `.ctor()` calling the base `.ctor()` after `prelude`
    pub fn construction_ctor_with(&mut self, prelude: Vec<Instr>, epilogue: Vec<Instr>) -> usize {
        let base = self.base_ctor(vec![]);
        let mut b = BodyBuilder::new();
        b.emit_all(prelude);
        b.load_arg(0);
        b.call(base);
        b.emit_all(epilogue);
        b.ret();
        let mut ctor = MethodDef::new(CONSTRUCTOR_NAME, vec![], TypeSig::Void);
        ctor.flags = method_flags::SPECIAL_NAME;
        ctor.body = Some(b.build().unwrap());
        self.def().add_method(ctor) as usize
    }

    pub fn construction_ctor(&mut self) -> usize {
        self.construction_ctor_with(vec![], vec![])
    }

    /// `.ctor(IntPtr)` forwarding to the base
    pub fn rehydration_ctor(&mut self) -> usize {
        let base = self.base_ctor(vec![TypeSig::IntPtr]);
        let mut b = BodyBuilder::new();
        b.load_arg(0);
        b.load_arg(1);
        b.call(base);
        b.ret();
        let mut ctor = MethodDef::new(
            CONSTRUCTOR_NAME,
            vec![ParamDef::new("nativePtr", TypeSig::IntPtr)],
            TypeSig::Void,
        );
        ctor.flags = method_flags::SPECIAL_NAME;
        ctor.body = Some(b.build().unwrap());
        self.def().add_method(ctor) as usize
    }

    /// Auto-property with a compiler-generated backing field
    pub fn property(&mut self, prop: Prop) -> &mut Self {
        let backing_name = format!("<{}>k__BackingField", prop.name);
        let backing = self.field_ref(&backing_name, prop.ty.clone());
        let mut field = FieldDef::new(&backing_name, prop.ty.clone());
        field.flags = field_flags::COMPILER_GENERATED;
        self.def().fields.push(field);

        let mut b = BodyBuilder::new();
        b.load_arg(0);
        b.emit(Instr::LoadField(backing));
        b.ret();
        let mut getter = MethodDef::new(&format!("get_{}", prop.name), vec![], prop.ty.clone());
        getter.flags = method_flags::SPECIAL_NAME;
        getter.body = Some(b.build().unwrap());
        let getter = self.def().add_method(getter);

        let setter = if prop.setter {
            let mut b = BodyBuilder::new();
            b.load_arg(0);
            b.load_arg(1);
            b.emit(Instr::StoreField(backing));
            b.ret();
            let mut setter = MethodDef::new(
                &format!("set_{}", prop.name),
                vec![ParamDef::new("value", prop.ty.clone())],
                TypeSig::Void,
            );
            setter.flags = method_flags::SPECIAL_NAME;
            setter.body = Some(b.build().unwrap());
            Some(self.def().add_method(setter))
        } else {
            None
        };

        let mut attributes = vec![prop.annotation];
        attributes.extend(prop.extra);
        self.def().properties.push(PropertyDef {
            name: prop.name.to_string(),
            ty: prop.ty,
            getter: Some(getter),
            setter,
            attributes,
            source: None,
        });
        self
    }

    /// Plain method returning a constant of `ret`
    pub fn method(&mut self, name: &str, params: Vec<ParamDef>, ret: TypeSig) -> usize {
        let mut b = BodyBuilder::new();
        match ret {
            TypeSig::Void => {}
            TypeSig::Bool | TypeSig::I32 => b.const_i32(1),
            _ => b.emit(Instr::ConstNull),
        }
        b.ret();
        let mut method = MethodDef::new(name, params, ret);
        method.body = Some(b.build().unwrap());
        self.def().add_method(method) as usize
    }

    /// Exposed function with a trivial body
    pub fn function(
        &mut self,
        name: &str,
        params: Vec<ParamDef>,
        ret: TypeSig,
        annotation: Attribute,
    ) -> usize {
        let index = self.method(name, params, ret);
        self.def().methods[index].attributes.push(annotation);
        index
    }
}
