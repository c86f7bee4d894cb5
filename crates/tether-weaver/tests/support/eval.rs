//! Minimal interpreter for woven bodies
//!
//! Executes generated accessors against a byte buffer standing in for native
//! memory. Runtime calls are answered by [`FakeLayout`] and a handful of
//! marshaller stand-ins; calls to module methods are interpreted recursively.

use std::collections::HashMap;
use tether_bytecode::{Instr, InstructionList, MemberRefKind, Module, NativeKind, TypeSig};
use tether_weaver::{LayoutQuery, NativeLayoutService};

/// Base address of the fake native heap; keeps zero free as "null"
pub const HEAP_BASE: usize = 0x1000;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    /// Managed object wrapping the native instance at this address
    Object(usize),
    /// Blittable struct value copied out of native memory
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(v) => *v,
            Value::Object(addr) => *addr as i64,
            Value::Null => 0,
            other => panic!("expected integer, got {:?}", other),
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(v) => *v != 0,
            _ => true,
        }
    }
}

/// Layout service handing out deterministic handles and 8-byte slots
#[derive(Debug, Default)]
pub struct FakeLayout {
    types: std::cell::RefCell<Vec<String>>,
    properties: std::cell::RefCell<HashMap<(usize, String), i32>>,
    functions: std::cell::RefCell<Vec<(usize, String)>>,
}

impl FakeLayout {
    fn intern(list: &mut Vec<String>, name: &str) -> usize {
        match list.iter().position(|n| n == name) {
            Some(index) => index + 1,
            None => {
                list.push(name.to_string());
                list.len()
            }
        }
    }

    /// Offset previously handed out for `name` on type `native`
    pub fn offset_of(&self, native: &str, name: &str) -> Option<i32> {
        let handle = self.types.borrow().iter().position(|n| n == native)? + 1;
        self.properties.borrow().get(&(handle, name.to_string())).copied()
    }
}

impl NativeLayoutService for FakeLayout {
    fn resolve_native_type(&self, name: &str) -> usize {
        Self::intern(&mut self.types.borrow_mut(), name)
    }

    fn resolve_struct_size(&self, type_handle: usize) -> i32 {
        let count = self
            .properties
            .borrow()
            .keys()
            .filter(|(h, _)| *h == type_handle)
            .count();
        (count.max(1) * 8) as i32
    }

    fn resolve_property_offset(&self, type_handle: usize, name: &str) -> i32 {
        let mut properties = self.properties.borrow_mut();
        let next = properties.keys().filter(|(h, _)| *h == type_handle).count() as i32 * 8;
        *properties
            .entry((type_handle, name.to_string()))
            .or_insert(next)
    }

    fn resolve_property_handle(&self, type_handle: usize, name: &str) -> usize {
        type_handle * 1000 + self.resolve_property_offset(type_handle, name) as usize
    }

    fn resolve_function_handle(&self, type_handle: usize, name: &str) -> usize {
        let mut functions = self.functions.borrow_mut();
        let key = (type_handle, name.to_string());
        match functions.iter().position(|f| *f == key) {
            Some(index) => 5000 + index,
            None => {
                functions.push(key);
                5000 + functions.len() - 1
            }
        }
    }

    fn resolve_function_arguments_size(&self, _function_handle: usize) -> i32 {
        64
    }

    fn resolve_boolean_storage_width(&self) -> i32 {
        1
    }

    fn resolve_array_element_size(&self, _type_handle: usize, _name: &str) -> i32 {
        4
    }
}

/// Interpreter state: statics, native heap and the layout service
pub struct Machine<'m> {
    module: &'m Module,
    pub layout: FakeLayout,
    statics: HashMap<String, Value>,
    heap: Vec<u8>,
    initialized: Vec<String>,
}

impl<'m> Machine<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            layout: FakeLayout::default(),
            statics: HashMap::new(),
            heap: Vec::new(),
            initialized: Vec::new(),
        }
    }

    /// Allocate zeroed native memory and return its address
    pub fn alloc(&mut self, size: usize) -> usize {
        let addr = HEAP_BASE + self.heap.len();
        self.heap.resize(self.heap.len() + size, 0);
        addr
    }

    /// Managed object backed by a fresh native instance
    pub fn new_object(&mut self, size: usize) -> Value {
        Value::Object(self.alloc(size))
    }

    pub fn read(&self, addr: usize, kind: NativeKind) -> i64 {
        let start = addr - HEAP_BASE;
        let bytes = &self.heap[start..start + kind.size()];
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        let raw = i64::from_le_bytes(buf);
        match kind {
            NativeKind::I8 => raw as i8 as i64,
            NativeKind::I16 => raw as i16 as i64,
            NativeKind::I32 => raw as i32 as i64,
            _ => raw,
        }
    }

    pub fn write(&mut self, addr: usize, kind: NativeKind, value: i64) {
        let start = addr - HEAP_BASE;
        let bytes = value.to_le_bytes();
        self.heap[start..start + kind.size()].copy_from_slice(&bytes[..kind.size()]);
    }

    pub fn static_value(&self, owner: &str, name: &str) -> Option<&Value> {
        self.statics.get(&format!("{}::{}", owner, name))
    }

    /// Run the type initializer of `ty` once
    pub fn initialize(&mut self, ty: &str) {
        if self.initialized.iter().any(|t| t == ty) {
            return;
        }
        self.initialized.push(ty.to_string());
        let def = self.find_type(ty);
        if def.type_initializer().is_some() {
            self.invoke(ty, ".cctor", vec![]);
        }
    }

    fn find_type(&self, ty: &str) -> &'m tether_bytecode::TypeDef {
        let module: &'m Module = self.module;
        module
            .types
            .iter()
            .find(|t| t.full_name() == ty)
            .unwrap_or_else(|| panic!("type '{}' not in module", ty))
    }

    /// Interpret `ty::method` with the given arguments (receiver first)
    pub fn invoke(&mut self, ty: &str, method: &str, args: Vec<Value>) -> Value {
        let module: &'m Module = self.module;
        let def = self.find_type(ty);
        let method = def
            .methods
            .iter()
            .find(|m| m.name == method && m.arg_count() == args.len())
            .unwrap_or_else(|| panic!("method '{}::{}' not found", ty, method));
        let body = method.body.as_ref().expect("method has a body");
        let list = InstructionList::decode_body(body).expect("body decodes");
        let mut args = args;
        let mut locals = vec![Value::Null; body.locals.len()];
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;

        loop {
            let instr = list.get(pc).unwrap_or_else(|| panic!("fell off the end of {}", method.name));
            pc += 1;
            match instr {
                Instr::Nop => {}
                Instr::Pop => {
                    stack.pop();
                }
                Instr::Dup => {
                    let top = stack.last().cloned().expect("dup on empty stack");
                    stack.push(top);
                }
                Instr::ConstNull => stack.push(Value::Null),
                Instr::ConstI32(v) => stack.push(Value::Int(*v as i64)),
                Instr::ConstI64(v) => stack.push(Value::Int(*v)),
                Instr::ConstF32(v) => stack.push(Value::Float(*v as f64)),
                Instr::ConstF64(v) => stack.push(Value::Float(*v)),
                Instr::ConstStr(index) => {
                    let s = module.constants.get_string(*index).expect("string constant");
                    stack.push(Value::Str(s.to_string()));
                }
                Instr::LoadArg(i) => stack.push(args[*i as usize].clone()),
                Instr::StoreArg(i) => args[*i as usize] = stack.pop().expect("value"),
                Instr::LoadLocal(i) => stack.push(locals[*i as usize].clone()),
                Instr::StoreLocal(i) => locals[*i as usize] = stack.pop().expect("value"),
                Instr::Add => {
                    let b = stack.pop().expect("rhs").as_int();
                    let a = stack.pop().expect("lhs").as_int();
                    stack.push(Value::Int(a + b));
                }
                Instr::Sub => {
                    let b = stack.pop().expect("rhs").as_int();
                    let a = stack.pop().expect("lhs").as_int();
                    stack.push(Value::Int(a - b));
                }
                Instr::Mul => {
                    let b = stack.pop().expect("rhs").as_int();
                    let a = stack.pop().expect("lhs").as_int();
                    stack.push(Value::Int(a * b));
                }
                Instr::ConvI | Instr::ConvI4 => {}
                Instr::Ceq => {
                    let b = stack.pop().expect("rhs");
                    let a = stack.pop().expect("lhs");
                    stack.push(Value::Int((a == b) as i64));
                }
                Instr::Clt | Instr::Cgt => {
                    let b = stack.pop().expect("rhs").as_int();
                    let a = stack.pop().expect("lhs").as_int();
                    let result = if matches!(instr, Instr::Clt) { a < b } else { a > b };
                    stack.push(Value::Int(result as i64));
                }
                Instr::Jmp(label) => pc = label.index(),
                Instr::JmpIfTrue(label) => {
                    if stack.pop().expect("condition").is_truthy() {
                        pc = label.index();
                    }
                }
                Instr::JmpIfFalse(label) => {
                    if !stack.pop().expect("condition").is_truthy() {
                        pc = label.index();
                    }
                }
                Instr::Call(token) | Instr::CallVirt(token) => {
                    let member = module.member_ref(*token).expect("call token").clone();
                    let MemberRefKind::Method(sig) = &member.kind else {
                        panic!("call to field '{}'", member.name);
                    };
                    let count = sig.params.len() + sig.has_this as usize;
                    let call_args = stack.split_off(stack.len() - count);
                    let result = self.call(&member.owner, &member.name, call_args);
                    if !sig.ret.is_void() {
                        stack.push(result);
                    }
                }
                Instr::Ret => {
                    return if method.return_type.is_void() {
                        Value::Null
                    } else {
                        stack.pop().expect("return value")
                    };
                }
                Instr::LoadField(token) => {
                    let member = module.member_ref(*token).expect("field token");
                    let this = stack.pop().expect("receiver");
                    match (member.name.as_str(), this) {
                        ("NativePtr", Value::Object(addr)) => stack.push(Value::Int(addr as i64)),
                        (name, this) => panic!("unsupported field load '{}' on {:?}", name, this),
                    }
                }
                Instr::LoadStatic(token) => {
                    let key = self.static_key(*token);
                    stack.push(self.statics.get(&key).cloned().unwrap_or(Value::Int(0)));
                }
                Instr::StoreStatic(token) => {
                    let key = self.static_key(*token);
                    let value = stack.pop().expect("static value");
                    self.statics.insert(key, value);
                }
                Instr::LoadInd(kind) => {
                    let addr = stack.pop().expect("address").as_int() as usize;
                    stack.push(Value::Int(self.read(addr, *kind)));
                }
                Instr::StoreInd(kind) => {
                    let value = stack.pop().expect("value").as_int();
                    let addr = stack.pop().expect("address").as_int() as usize;
                    self.write(addr, *kind, value);
                }
                Instr::LoadObj(token) => {
                    let size = self.value_size(*token);
                    let start = stack.pop().expect("address").as_int() as usize - HEAP_BASE;
                    stack.push(Value::Bytes(self.heap[start..start + size].to_vec()));
                }
                Instr::StoreObj(token) => {
                    let size = self.value_size(*token);
                    let bytes = match stack.pop().expect("value") {
                        Value::Bytes(bytes) => bytes,
                        other => panic!("expected struct bytes, got {:?}", other),
                    };
                    assert_eq!(bytes.len(), size, "struct value has the wrong size");
                    let start = stack.pop().expect("address").as_int() as usize - HEAP_BASE;
                    self.heap[start..start + size].copy_from_slice(&bytes);
                }
                Instr::LocalAlloc => {
                    let size = stack.pop().expect("size").as_int() as usize;
                    let addr = self.alloc(size);
                    stack.push(Value::Int(addr as i64));
                }
                Instr::InitBlock => {
                    let size = stack.pop().expect("size").as_int() as usize;
                    let value = stack.pop().expect("fill").as_int() as u8;
                    let addr = stack.pop().expect("address").as_int() as usize;
                    let start = addr - HEAP_BASE;
                    self.heap[start..start + size].fill(value);
                }
                other => panic!("instruction {:?} is not supported by the test machine", other),
            }
        }
    }

    /// Size of a blittable value type as reported by the layout service
    pub fn value_size(&self, token: u32) -> usize {
        let sig = self.module.type_ref(token).expect("type token");
        let name = sig.type_name().expect("named value type");
        let handle = self.layout.resolve_native_type(&name.name);
        self.layout.resolve_struct_size(handle) as usize
    }

    /// Copy `len` bytes of native memory
    pub fn read_bytes(&self, addr: usize, len: usize) -> Vec<u8> {
        let start = addr - HEAP_BASE;
        self.heap[start..start + len].to_vec()
    }

    fn static_key(&self, token: u32) -> String {
        let member = self.module.member_ref(token).expect("static token");
        format!("{}::{}", member.owner, member.name)
    }

    fn call(&mut self, owner: &TypeSig, name: &str, args: Vec<Value>) -> Value {
        let owner_name = owner.to_string();
        match owner_name.as_str() {
            "Tether.Runtime.NativeLayout" => self.layout_call(name, &args),
            "Tether.Runtime.NativeObject" => match name {
                "CheckLiveness" | ".ctor" => Value::Null,
                other => panic!("unexpected native object call '{}'", other),
            },
            "Tether.Runtime.BoolMarshaller" => match name {
                "FromNative" => {
                    let addr = args[0].as_int() as usize;
                    Value::Int((self.read(addr, NativeKind::U8) != 0) as i64)
                }
                "ToNative" => {
                    let addr = args[0].as_int() as usize;
                    let flag = args[2].is_truthy() as i64;
                    self.write(addr, NativeKind::U8, flag);
                    Value::Null
                }
                other => panic!("unexpected bool marshaller call '{}'", other),
            },
            ty => {
                self.initialize(ty);
                self.invoke(ty, name, args)
            }
        }
    }

    fn layout_call(&mut self, name: &str, args: &[Value]) -> Value {
        let text = |v: &Value| match v {
            Value::Str(s) => s.clone(),
            other => panic!("expected string, got {:?}", other),
        };
        let handle = |v: &Value| v.as_int() as usize;
        let query = LayoutQuery::from_method_name(name)
            .unwrap_or_else(|| panic!("unknown layout query '{}'", name));
        let layout = &self.layout;
        let result = match query {
            LayoutQuery::NativeType => layout.resolve_native_type(&text(&args[0])) as i64,
            LayoutQuery::StructSize => layout.resolve_struct_size(handle(&args[0])) as i64,
            LayoutQuery::PropertyOffset => {
                layout.resolve_property_offset(handle(&args[0]), &text(&args[1])) as i64
            }
            LayoutQuery::PropertyHandle => {
                layout.resolve_property_handle(handle(&args[0]), &text(&args[1])) as i64
            }
            LayoutQuery::FunctionHandle => {
                layout.resolve_function_handle(handle(&args[0]), &text(&args[1])) as i64
            }
            LayoutQuery::FunctionArgumentsSize => {
                layout.resolve_function_arguments_size(handle(&args[0])) as i64
            }
            LayoutQuery::BooleanStorageWidth => layout.resolve_boolean_storage_width() as i64,
            LayoutQuery::ArrayElementSize => {
                layout.resolve_array_element_size(handle(&args[0]), &text(&args[1])) as i64
            }
        };
        Value::Int(result)
    }
}
