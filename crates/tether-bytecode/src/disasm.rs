//! Human-readable module listings

use std::fmt::Write;

use crate::attribute::{AttrValue, Attribute};
use crate::instr::{Instr, InstructionList};
use crate::module::{flags, Access, MemberRefKind, MethodDef, Module, TypeDef, TypeKind};

fn access_name(access: Access) -> &'static str {
    match access {
        Access::Private => "private",
        Access::Protected => "protected",
        Access::Internal => "internal",
        Access::Public => "public",
    }
}

fn kind_name(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Class => "class",
        TypeKind::Struct => "struct",
        TypeKind::Enum => "enum",
        TypeKind::Interface => "interface",
    }
}

fn format_value(value: &AttrValue) -> String {
    match value {
        AttrValue::Null => "null".to_string(),
        AttrValue::Bool(b) => b.to_string(),
        AttrValue::Int(i) => i.to_string(),
        AttrValue::String(s) => format!("{:?}", s),
        AttrValue::Type(sig) => format!("typeof({})", sig),
    }
}

fn format_attribute(attr: &Attribute) -> String {
    let mut parts: Vec<String> = attr.args.iter().map(format_value).collect();
    parts.extend(
        attr.named
            .iter()
            .map(|(name, value)| format!("{} = {}", name, format_value(value))),
    );
    if parts.is_empty() {
        format!("[{}]", attr.type_name)
    } else {
        format!("[{}({})]", attr.type_name, parts.join(", "))
    }
}

/// Render one instruction, resolving tokens against the module
pub fn format_instr(module: &Module, instr: &Instr, offsets: &[u32]) -> String {
    let op = instr.opcode().name();
    match instr {
        Instr::ConstI32(v) => format!("{} {}", op, v),
        Instr::ConstI64(v) => format!("{} {}", op, v),
        Instr::ConstF32(v) => format!("{} {}", op, v),
        Instr::ConstF64(v) => format!("{} {}", op, v),
        Instr::ConstStr(index) => match module.constants.get_string(*index) {
            Some(s) => format!("{} {:?}", op, s),
            None => format!("{} <bad string {}>", op, index),
        },
        Instr::LoadArg(i)
        | Instr::StoreArg(i)
        | Instr::LoadArgAddr(i)
        | Instr::LoadLocal(i)
        | Instr::StoreLocal(i)
        | Instr::LoadLocalAddr(i) => format!("{} {}", op, i),
        Instr::Jmp(label) | Instr::JmpIfTrue(label) | Instr::JmpIfFalse(label) => {
            match offsets.get(label.index()) {
                Some(offset) => format!("{} IL_{:04x}", op, offset),
                None => format!("{} <bad label {}>", op, label.0),
            }
        }
        Instr::LoadInd(kind) | Instr::StoreInd(kind) => format!("{}.{}", op, kind.name()),
        _ => {
            if let Some(token) = instr.member_token() {
                match module.member_ref(token) {
                    Some(member) => {
                        let detail = match &member.kind {
                            MemberRefKind::Field { ty, .. } => format!("{} ", ty),
                            MemberRefKind::Method(sig) => format!("{} ", sig.ret),
                        };
                        format!("{} {}{}::{}", op, detail, member.owner, member.name)
                    }
                    None => format!("{} <bad token {}>", op, token),
                }
            } else if let Some(token) = instr.type_token() {
                match module.type_ref(token) {
                    Some(sig) => format!("{} {}", op, sig),
                    None => format!("{} <bad type {}>", op, token),
                }
            } else {
                op.to_string()
            }
        }
    }
}

fn disassemble_method(out: &mut String, module: &Module, method: &MethodDef) {
    let params: Vec<String> = method
        .params
        .iter()
        .map(|p| {
            let prefix = if p.is_out() { "out " } else { "" };
            format!("{}{} {}", prefix, p.ty, p.name)
        })
        .collect();
    let _ = writeln!(
        out,
        "  .method {} {}{} {}({})",
        access_name(method.access),
        if method.is_static() { "static " } else { "instance " },
        method.return_type,
        method.name,
        params.join(", ")
    );
    for attr in &method.attributes {
        let _ = writeln!(out, "    {}", format_attribute(attr));
    }

    let body = match &method.body {
        Some(body) => body,
        None => {
            let _ = writeln!(out, "    // abstract");
            return;
        }
    };
    if !body.locals.is_empty() {
        let locals: Vec<String> = body.locals.iter().map(|l| l.to_string()).collect();
        let _ = writeln!(out, "    .locals ({})", locals.join(", "));
    }
    match InstructionList::decode(&body.code) {
        Ok(list) => {
            let offsets = list.offsets();
            for (index, instr) in list.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "    IL_{:04x}: {}",
                    offsets[index],
                    format_instr(module, instr, &offsets)
                );
            }
        }
        Err(e) => {
            let _ = writeln!(out, "    // undecodable body: {}", e);
        }
    }
}

fn disassemble_type(out: &mut String, module: &Module, ty: &TypeDef) {
    let mut header = format!(".{} {}", kind_name(ty.kind), ty.full_name());
    if ty.is_abstract() {
        header.insert_str(0, "abstract ");
    }
    if let Some(base) = &ty.base {
        let _ = write!(header, " : {}", base);
    }
    if let Some(underlying) = &ty.enum_underlying {
        let _ = write!(header, " : {}", underlying);
    }
    let _ = writeln!(out, "{}", header);
    for attr in &ty.attributes {
        let _ = writeln!(out, "  {}", format_attribute(attr));
    }

    for field in &ty.fields {
        let mut line = format!(
            "  .field {} {}{} {}",
            access_name(field.access),
            if field.is_static() { "static " } else { "" },
            field.ty,
            field.name
        );
        if let Some(value) = field.constant {
            let _ = write!(line, " = {}", value);
        }
        let _ = writeln!(out, "{}", line);
        for attr in &field.attributes {
            let _ = writeln!(out, "    {}", format_attribute(attr));
        }
    }

    for property in &ty.properties {
        let accessor = |index: Option<u32>| {
            index
                .and_then(|i| ty.methods.get(i as usize))
                .map(|m| m.name.clone())
                .unwrap_or_else(|| "-".to_string())
        };
        let _ = writeln!(
            out,
            "  .property {} {} {{ get: {}, set: {} }}",
            property.ty,
            property.name,
            accessor(property.getter),
            accessor(property.setter)
        );
        for attr in &property.attributes {
            let _ = writeln!(out, "    {}", format_attribute(attr));
        }
    }

    for method in &ty.methods {
        disassemble_method(out, module, method);
    }
}

/// Produce a full listing of a module
pub fn disassemble(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        ".module {} (version {}{})",
        module.metadata.name,
        module.version,
        if module.flags & flags::WOVEN != 0 { ", woven" } else { "" }
    );
    for reference in &module.metadata.references {
        let _ = writeln!(out, ".reference {}", reference);
    }
    for ty in &module.types {
        let _ = writeln!(out);
        disassemble_type(&mut out, module, ty);
    }
    out
}
