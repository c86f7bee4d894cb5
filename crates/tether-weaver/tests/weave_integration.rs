//! End-to-end weaving of programmatically built modules

mod support;

use support::eval::{Machine, Value};
use support::{attr, context, context_with_libraries, game, root, weave_ok, GameModule, Prop};
use tether_bytecode::module::{method_flags, CONSTRUCTOR_NAME};
use tether_bytecode::{
    AttrValue, BodyBuilder, Instr, InstructionList, MethodDef, MethodSig, Module, NativeKind,
    ParamDef, TypeDef, TypeSig,
};
use tether_weaver::{codes, Diagnostic, Diagnostics, ProcessingContext, WeaveOutcome, Weaver};

fn rejected(module: &Module) -> Diagnostics {
    let ctx = context();
    match Weaver::new(&ctx).weave(module).unwrap() {
        WeaveOutcome::Rejected(diagnostics) => diagnostics,
        WeaveOutcome::Rewritten(_) => panic!("module was unexpectedly accepted"),
        WeaveOutcome::NoBindings => panic!("module had no bindings"),
    }
}

fn find<'m>(module: &'m Module, name: &str) -> &'m TypeDef {
    module
        .types
        .iter()
        .find(|t| t.name == name)
        .unwrap_or_else(|| panic!("type '{}' missing", name))
}

fn fixed_ints() -> TypeSig {
    TypeSig::generic("Tether.Runtime", "FixedArray", vec![TypeSig::I32])
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_enum_with_gap_is_rejected() {
    let mut gm = GameModule::new();
    gm.enumeration("Team", &[("Red", 0), ("Blue", 2)]);
    let diagnostics = rejected(&gm.build());
    assert!(diagnostics.has_code(codes::ENUM_SEQUENCE));
    assert_eq!(diagnostics.error_count(), 1);
}

#[test]
fn test_duplicate_construction_ctor_without_rehydration() {
    let mut gm = GameModule::new();
    {
        let mut pawn = gm.bare_class("Pawn", root());
        pawn.construction_ctor();
        pawn.construction_ctor();
    }
    let diagnostics = rejected(&gm.build());
    let errors: Vec<_> = diagnostics.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, Some(codes::MISSING_REHYDRATION_CTOR));
    assert!(errors[0].message.contains("rehydration constructor not found"));
}

#[test]
fn test_missing_custom_condition_method() {
    let mut gm = GameModule::new();
    gm.class("Pawn", root()).property(
        Prop::new("Health", TypeSig::I32)
            .named("Condition", AttrValue::Int(8))
            .named("CustomCondition", AttrValue::String("ShouldSend".to_string()))
            .with(attr("Replicated")),
    );
    let diagnostics = rejected(&gm.build());
    assert!(diagnostics.has_code(codes::INVALID_CUSTOM_CONDITION));
}

#[test]
fn test_custom_condition_method_found() {
    let mut gm = GameModule::new();
    {
        let mut pawn = gm.class("Pawn", root());
        pawn.method("ShouldSend", vec![], TypeSig::Bool);
        pawn.property(
            Prop::new("Health", TypeSig::I32)
                .named("Condition", AttrValue::Int(8))
                .named("CustomCondition", AttrValue::String("ShouldSend".to_string()))
                .with(attr("Replicated")),
        );
    }
    weave_ok(&context(), &gm.build());
}

#[test]
fn test_category_required_exactly_when_visible() {
    let mut gm = GameModule::new();
    gm.class("Pawn", root())
        .property(Prop::new("Health", TypeSig::I32).with(attr("EditAnywhere")))
        .property(
            Prop::new("Armor", TypeSig::I32)
                .named("Category", AttrValue::String("Stats".to_string())),
        );
    let diagnostics = rejected(&gm.build());
    assert!(diagnostics.has_code(codes::MISSING_CATEGORY));
    assert!(diagnostics.has_code(codes::UNUSED_CATEGORY));
    assert_eq!(diagnostics.error_count(), 2);
}

#[test]
fn test_removed_setter_still_called() {
    let mut gm = GameModule::new();
    {
        let mut pawn = gm.class("Pawn", root());
        pawn.property(
            Prop::new("Scores", fixed_ints()).named("ArrayDim", AttrValue::Int(3)),
        );
        let setter = pawn.method_ref("set_Scores", MethodSig::instance(vec![fixed_ints()], TypeSig::Void));
        let mut b = BodyBuilder::new();
        b.load_arg(0);
        b.emit(Instr::ConstNull);
        b.call(setter);
        b.ret();
        let index = pawn.method("Reset", vec![], TypeSig::Void);
        pawn.def().methods[index].body = Some(b.build().unwrap());
    }
    let diagnostics = rejected(&gm.build());
    assert!(diagnostics.has_code(codes::SETTER_STILL_REFERENCED));
}

// ============================================================================
// Structs and hashing
// ============================================================================

fn geometry(point_fields: &[(&str, TypeSig)]) -> Module {
    let mut gm = GameModule::new();
    gm.structure("Point", point_fields);
    gm.structure("Line", &[("Start", game("Point")), ("End", game("Point"))]);
    gm.build()
}

fn hash_of(module: &Module, name: &str) -> String {
    hash_in(&context(), module, name)
}

fn hash_in(ctx: &ProcessingContext, module: &Module, name: &str) -> String {
    let woven = weave_ok(ctx, module);
    woven
        .report
        .types
        .iter()
        .find(|t| t.name == format!("Game.{}", name))
        .map(|t| t.hash.clone())
        .unwrap()
}

#[test]
fn test_blittable_structs_marked() {
    let module = geometry(&[("X", TypeSig::F32), ("Y", TypeSig::F32)]);
    let woven = weave_ok(&context(), &module);
    assert!(woven.diagnostics.is_empty());
    for name in ["Point", "Line"] {
        let def = find(&woven.module, name);
        assert!(
            def.attributes.iter().any(|a| a.is("Tether.Attributes.Blittable")),
            "{} should be marked blittable",
            name
        );
        assert!(def.find_method(CONSTRUCTOR_NAME).is_none());
    }
}

#[test]
fn test_embedded_struct_change_propagates_to_hash() {
    let before = geometry(&[("X", TypeSig::F32), ("Y", TypeSig::F32)]);
    let after = geometry(&[("X", TypeSig::F32), ("Z", TypeSig::F32)]);
    assert_ne!(hash_of(&before, "Point"), hash_of(&after, "Point"));
    assert_ne!(hash_of(&before, "Line"), hash_of(&after, "Line"));
    assert_eq!(hash_of(&before, "Line"), hash_of(&before, "Line"));
}

/// Already woven library declaring `Point`, resolved through the search paths
fn shapes_library(point_fields: &[(&str, TypeSig)]) -> Module {
    let mut gm = GameModule::new();
    gm.structure("Point", point_fields)
        .attributes
        .push(attr("Blittable"));
    let mut module = gm.build();
    module.metadata.name = "Game.Shapes".to_string();
    module
}

#[test]
fn test_search_path_struct_change_propagates_to_hash() {
    let mut gm = GameModule::new();
    gm.structure("Line", &[("Start", game("Point")), ("End", game("Point"))]);
    let module = gm.build();

    let narrow = context_with_libraries(vec![shapes_library(&[
        ("X", TypeSig::F32),
        ("Y", TypeSig::F32),
    ])]);
    let wide = context_with_libraries(vec![shapes_library(&[
        ("X", TypeSig::F64),
        ("Z", TypeSig::F64),
        ("W", TypeSig::F64),
    ])]);
    assert_ne!(hash_in(&narrow, &module, "Line"), hash_in(&wide, &module, "Line"));
    assert_eq!(hash_in(&narrow, &module, "Line"), hash_in(&narrow, &module, "Line"));
}

#[test]
fn test_struct_with_list_of_itself_is_woven() {
    let children = TypeSig::generic("System.Collections.Generic", "IList", vec![game("Node")]);
    let mut gm = GameModule::new();
    gm.structure("Node", &[("Value", TypeSig::I32), ("Children", children)]);
    let woven = weave_ok(&context(), &gm.build());

    let def = find(&woven.module, "Node");
    assert!(def.find_method("ToNative").is_some());
    assert!(!def.attributes.iter().any(|a| a.is("Tether.Attributes.Blittable")));
    let report = woven
        .report
        .types
        .iter()
        .find(|t| t.name == "Game.Node")
        .unwrap();
    assert_eq!(report.hash.len(), 64);
}

#[test]
fn test_non_blittable_struct_gets_marshaling_members() {
    let mut gm = GameModule::new();
    gm.structure("Hit", &[("Damage", TypeSig::I32), ("Critical", TypeSig::Bool)]);
    let woven = weave_ok(&context(), &gm.build());
    let def = find(&woven.module, "Hit");
    let ctor = def.find_method(CONSTRUCTOR_NAME).unwrap();
    assert_eq!(def.methods[ctor].params[0].ty, TypeSig::IntPtr);
    assert!(def.find_method("ToNative").is_some());
    assert!(def.find_field("NativeDataSize").is_some());
    assert!(def.find_field("Critical_Width").is_some());
    assert!(def.type_initializer().is_some());
}

// ============================================================================
// Classes
// ============================================================================

#[test]
fn test_base_class_hash_recorded_on_derived() {
    let mut gm = GameModule::new();
    // Derived first: ordering must still hash the base before it
    gm.class("Hero", game("Pawn"))
        .property(Prop::new("Level", TypeSig::I32));
    gm.class("Pawn", root())
        .property(Prop::new("Health", TypeSig::I32));
    let woven = weave_ok(&context(), &gm.build());

    let report = |name: &str| {
        woven
            .report
            .types
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .unwrap()
    };
    let pawn = report("Game.Pawn");
    let hero = report("Game.Hero");
    assert_eq!(pawn.base_hash, None);
    assert_eq!(hero.base_hash, Some(pawn.hash.clone()));
    assert_ne!(hero.hash, pawn.hash);
}

#[test]
fn test_fixed_array_setter_removed() {
    let mut gm = GameModule::new();
    gm.class("Pawn", root()).property(
        Prop::new("Scores", fixed_ints()).named("ArrayDim", AttrValue::Int(3)),
    );
    let woven = weave_ok(&context(), &gm.build());
    let def = find(&woven.module, "Pawn");

    assert!(def.find_method("set_Scores").is_none());
    assert!(def.find_method("get_Scores").is_some());
    let property = &def.properties[def.find_property("Scores").unwrap()];
    assert_eq!(property.setter, None);
    assert_eq!(
        def.methods[property.getter.unwrap() as usize].name,
        "get_Scores"
    );
    assert!(def.find_field("Scores_Wrapper").is_some());
    assert!(def.find_field("<Scores>k__BackingField").is_none());
}

#[test]
fn test_property_round_trip_through_native_memory() {
    let mut gm = GameModule::new();
    gm.class("Pawn", root())
        .property(Prop::new("Health", TypeSig::I32))
        .property(Prop::new("Alive", TypeSig::Bool));
    let woven = weave_ok(&context(), &gm.build());
    let def = find(&woven.module, "Pawn");
    assert!(def.find_field("<Health>k__BackingField").is_none());

    let mut machine = Machine::new(&woven.module);
    machine.initialize("Game.Pawn");
    let pawn = machine.new_object(64);
    let base = pawn.as_int() as usize;

    machine.invoke("Game.Pawn", "set_Health", vec![pawn.clone(), Value::Int(42)]);
    assert_eq!(
        machine.invoke("Game.Pawn", "get_Health", vec![pawn.clone()]),
        Value::Int(42)
    );
    let offset = machine
        .static_value("Game.Pawn", "Health_Offset")
        .unwrap()
        .as_int() as usize;
    assert_eq!(machine.read(base + offset, NativeKind::I32), 42);

    machine.invoke("Game.Pawn", "set_Alive", vec![pawn.clone(), Value::Int(1)]);
    assert_eq!(
        machine.invoke("Game.Pawn", "get_Alive", vec![pawn.clone()]),
        Value::Int(1)
    );
    machine.invoke("Game.Pawn", "set_Alive", vec![pawn.clone(), Value::Int(0)]);
    assert_eq!(
        machine.invoke("Game.Pawn", "get_Alive", vec![pawn]),
        Value::Int(0)
    );
}

#[test]
fn test_enum_and_struct_properties_round_trip() {
    let mut gm = GameModule::new();
    gm.enumeration("Team", &[("Red", 0), ("Blue", 1), ("Green", 2)]);
    gm.structure("Point", &[("X", TypeSig::F32), ("Y", TypeSig::F32)]);
    gm.class("Pawn", root())
        .property(Prop::new("Side", game("Team")))
        .property(Prop::new("Spot", game("Point")));
    let woven = weave_ok(&context(), &gm.build());

    let mut machine = Machine::new(&woven.module);
    machine.initialize("Game.Pawn");
    let pawn = machine.new_object(64);
    let base = pawn.as_int() as usize;
    let offset = |machine: &Machine<'_>, name: &str| {
        machine
            .static_value("Game.Pawn", name)
            .unwrap()
            .as_int() as usize
    };

    machine.invoke("Game.Pawn", "set_Side", vec![pawn.clone(), Value::Int(2)]);
    assert_eq!(
        machine.invoke("Game.Pawn", "get_Side", vec![pawn.clone()]),
        Value::Int(2)
    );
    let side = offset(&machine, "Side_Offset");
    assert_eq!(machine.read(base + side, NativeKind::U8), 2);

    let mut point = 1.5f32.to_le_bytes().to_vec();
    point.extend_from_slice(&(-4.0f32).to_le_bytes());
    machine.invoke(
        "Game.Pawn",
        "set_Spot",
        vec![pawn.clone(), Value::Bytes(point.clone())],
    );
    assert_eq!(
        machine.invoke("Game.Pawn", "get_Spot", vec![pawn]),
        Value::Bytes(point.clone())
    );
    let spot = offset(&machine, "Spot_Offset");
    assert_ne!(spot, side);
    assert_eq!(machine.read_bytes(base + spot, point.len()), point);
}

#[test]
fn test_early_initializer_moves_after_base_call() {
    let mut gm = GameModule::new();
    {
        let mut pawn = gm.bare_class("Pawn", root());
        pawn.property(Prop::new("Health", TypeSig::I32));
        let backing = pawn.field_ref("<Health>k__BackingField", TypeSig::I32);
        pawn.construction_ctor_with(
            vec![Instr::LoadArg(0), Instr::ConstI32(100), Instr::StoreField(backing)],
            vec![],
        );
        pawn.rehydration_ctor();
    }
    let woven = weave_ok(&context(), &gm.build());

    let def = find(&woven.module, "Pawn");
    let ctor = def
        .constructors()
        .find(|(_, m)| m.params.is_empty())
        .map(|(_, m)| m)
        .unwrap();
    let list = InstructionList::decode_body(ctor.body.as_ref().unwrap()).unwrap();
    assert_eq!(list.get(0), Some(&Instr::LoadArg(0)));
    assert!(matches!(list.get(1), Some(Instr::Call(_))));
    assert_eq!(list.get(3), Some(&Instr::ConstI32(100)));

    let mut machine = Machine::new(&woven.module);
    machine.initialize("Game.Pawn");
    let pawn = machine.new_object(64);
    machine.invoke("Game.Pawn", CONSTRUCTOR_NAME, vec![pawn.clone()]);
    assert_eq!(
        machine.invoke("Game.Pawn", "get_Health", vec![pawn]),
        Value::Int(100)
    );
}

fn single_error(diagnostics: &Diagnostics) -> &Diagnostic {
    let errors: Vec<_> = diagnostics.errors().collect();
    assert_eq!(errors.len(), 1, "expected one error, got {:?}", errors);
    errors[0]
}

#[test]
fn test_computed_early_initializer_is_rejected() {
    let mut gm = GameModule::new();
    {
        let mut pawn = gm.bare_class("Pawn", root());
        pawn.property(Prop::new("Health", TypeSig::I32));
        pawn.method("Compute", vec![], TypeSig::I32);
        let backing = pawn.field_ref("<Health>k__BackingField", TypeSig::I32);
        let compute = pawn.method_ref("Compute", MethodSig::instance(vec![], TypeSig::I32));
        pawn.construction_ctor_with(
            vec![
                Instr::LoadArg(0),
                Instr::LoadArg(0),
                Instr::Call(compute),
                Instr::StoreField(backing),
            ],
            vec![],
        );
        pawn.rehydration_ctor();
    }
    let diagnostics = rejected(&gm.build());
    let error = single_error(&diagnostics);
    assert_eq!(error.code, Some(codes::UNSUPPORTED_INITIALIZER));
    assert!(error.message.contains("unsupported initializer shape for 'Health'"));
}

#[test]
fn test_early_initializer_without_setter_is_rejected() {
    let mut gm = GameModule::new();
    {
        let mut pawn = gm.bare_class("Pawn", root());
        pawn.property(Prop::new("Scores", fixed_ints()).named("ArrayDim", AttrValue::Int(3)));
        let backing = pawn.field_ref("<Scores>k__BackingField", fixed_ints());
        pawn.construction_ctor_with(
            vec![Instr::LoadArg(0), Instr::ConstNull, Instr::StoreField(backing)],
            vec![],
        );
        pawn.rehydration_ctor();
    }
    let diagnostics = rejected(&gm.build());
    let error = single_error(&diagnostics);
    assert_eq!(error.code, Some(codes::UNSUPPORTED_INITIALIZER));
    assert!(error.message.contains("no setter to move it to"));
}

#[test]
fn test_constructor_without_base_call_is_rejected() {
    let mut gm = GameModule::new();
    {
        let mut pawn = gm.bare_class("Pawn", root());
        pawn.property(Prop::new("Health", TypeSig::I32));
        let backing = pawn.field_ref("<Health>k__BackingField", TypeSig::I32);
        let mut b = BodyBuilder::new();
        b.emit_all(vec![Instr::LoadArg(0), Instr::ConstI32(100), Instr::StoreField(backing)]);
        b.ret();
        let mut ctor = MethodDef::new(CONSTRUCTOR_NAME, vec![], TypeSig::Void);
        ctor.flags = method_flags::SPECIAL_NAME;
        ctor.body = Some(b.build().unwrap());
        pawn.def().add_method(ctor);
        pawn.rehydration_ctor();
    }
    let diagnostics = rejected(&gm.build());
    let error = single_error(&diagnostics);
    assert_eq!(error.code, Some(codes::BASE_CTOR_CALL_NOT_FOUND));
    assert!(error.message.contains("no base constructor call"));
}

#[test]
fn test_function_split_into_shim_implementation_and_invoker() {
    let mut gm = GameModule::new();
    {
        let mut pawn = gm.class("Pawn", root());
        let index = pawn.function(
            "Heal",
            vec![ParamDef::new("amount", TypeSig::I32)],
            TypeSig::I32,
            attr("NativeFunction"),
        );
        let mut b = BodyBuilder::new();
        b.load_arg(1);
        b.const_i32(1);
        b.emit(Instr::Add);
        b.ret();
        pawn.def().methods[index].body = Some(b.build().unwrap());
    }
    let woven = weave_ok(&context(), &gm.build());
    let def = find(&woven.module, "Pawn");

    let shim = &def.methods[def.find_method("Heal").unwrap()];
    assert!(shim.attributes.iter().any(|a| a.is("Tether.Attributes.NativeFunction")));
    let implementation = &def.methods[def.find_method("Heal_Implementation").unwrap()];
    assert!(implementation.attributes.is_empty());
    let invoker = &def.methods[def.find_method("Invoke_Heal").unwrap()];
    assert_eq!(invoker.params.len(), 2);
    assert!(def.find_field("Heal_NativeFunction").is_some());
    assert!(def.find_field("Heal_ParamsSize").is_some());

    // Native side calls the invoker with a packed parameter buffer
    let mut machine = Machine::new(&woven.module);
    machine.initialize("Game.Pawn");
    let pawn = machine.new_object(64);
    let buffer = machine.alloc(64);
    let ret = machine.alloc(8);
    let offset = machine
        .static_value("Game.Pawn", "Heal_amount_Offset")
        .unwrap()
        .as_int() as usize;
    machine.write(buffer + offset, NativeKind::I32, 41);
    machine.invoke(
        "Game.Pawn",
        "Invoke_Heal",
        vec![pawn, Value::Int(buffer as i64), Value::Int(ret as i64)],
    );
    assert_eq!(machine.read(ret, NativeKind::I32), 42);
}

// ============================================================================
// Module-level behavior
// ============================================================================

#[test]
fn test_woven_module_is_not_woven_again() {
    let mut gm = GameModule::new();
    gm.class("Pawn", root())
        .property(Prop::new("Health", TypeSig::I32));
    let ctx = context();
    let woven = weave_ok(&ctx, &gm.build());
    assert!(woven.module.is_woven());

    // Survives encoding
    let decoded = Module::decode(&woven.module.encode()).unwrap();
    assert!(matches!(
        Weaver::new(&ctx).weave(&decoded).unwrap(),
        WeaveOutcome::NoBindings
    ));
}

#[test]
fn test_module_without_annotations_has_no_bindings() {
    let mut module = Module::new("Game");
    module
        .types
        .push(TypeDef::new("Game", "Plain", tether_bytecode::TypeKind::Class));
    let ctx = context();
    assert!(matches!(
        Weaver::new(&ctx).weave(&module).unwrap(),
        WeaveOutcome::NoBindings
    ));
}
