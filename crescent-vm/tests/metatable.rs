use std::rc::Rc;

use crescent_asm::{rk_constant, Instruction, Opcode};
use crescent_vm::closure::Closure;
use crescent_vm::prelude::*;

/// Run a prototype after installing `globals` into the globals table.
fn run_with_globals(proto: Prototype, globals: &[(&str, Value)]) -> Vec<Value> {
    let mut vm = Interpreter::new();
    vm.open_base();
    for (name, value) in globals {
        vm.push(value.clone());
        vm.set_global(name).unwrap();
    }
    vm.load_prototype(Rc::new(proto));
    vm.call(0, -1).expect("program should complete");
    (0..=vm.top_index()).map(|i| vm.value_at(i)).collect()
}

fn host(f: impl Fn(&mut Interpreter) -> Result<usize, VmError> + 'static) -> Value {
    Value::Closure(Rc::new(Closure::from_host(Rc::new(f), Vec::new())))
}

fn env_upvalue() -> Vec<UpvalDesc> {
    vec![UpvalDesc {
        in_stack: true,
        index: 0,
    }]
}

#[test]
fn add_falls_back_to_the_metamethod() {
    // local a = setmetatable({}, {__add = function() return "x" end})
    // return a + 1
    let a = Table::new().into_ref();
    let mt = Table::new().into_ref();
    mt.borrow_mut().set(
        Value::from("__add"),
        host(|ls| {
            ls.push_string("x");
            Ok(1)
        }),
    );
    a.borrow_mut().set_metatable(Some(mt));

    let proto = Prototype {
        max_stack_size: 2,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabc(Opcode::Add, 1, 0, rk_constant(1)),
            Instruction::iabc(Opcode::Return, 1, 2, 0),
        ],
        constants: vec![Value::from("a"), Value::Integer(1)],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    let out = run_with_globals(proto, &[("a", Value::Table(a))]);
    assert_eq!(out, vec![Value::from("x")]);
}

#[test]
fn metamethod_is_taken_from_the_second_operand_too() {
    // return 1 + b  where only b has __add
    let b = Table::new().into_ref();
    let mt = Table::new().into_ref();
    mt.borrow_mut().set(
        Value::from("__add"),
        host(|ls| {
            // called with (1, b); report the first operand back
            ls.push_value(0);
            Ok(1)
        }),
    );
    b.borrow_mut().set_metatable(Some(mt));

    let proto = Prototype {
        max_stack_size: 2,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabc(Opcode::Add, 1, rk_constant(1), 0),
            Instruction::iabc(Opcode::Return, 1, 2, 0),
        ],
        constants: vec![Value::from("b"), Value::Integer(1)],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    let out = run_with_globals(proto, &[("b", Value::Table(b))]);
    assert_eq!(out, vec![Value::Integer(1)]);
}

#[test]
fn index_function_receives_table_and_key() {
    let t = Table::new().into_ref();
    let mt = Table::new().into_ref();
    mt.borrow_mut().set(
        Value::from("__index"),
        host(|ls| {
            // (table, key) -> "<key>!"
            let key = ls.to_string(1);
            ls.push_string(&format!("{key}!"));
            Ok(1)
        }),
    );
    t.borrow_mut().set_metatable(Some(mt));

    let proto = Prototype {
        max_stack_size: 2,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabc(Opcode::GetTable, 1, 0, rk_constant(1)),
            Instruction::iabc(Opcode::Return, 1, 2, 0),
        ],
        constants: vec![Value::from("t"), Value::from("missing")],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    let out = run_with_globals(proto, &[("t", Value::Table(t))]);
    assert_eq!(out, vec![Value::from("missing!")]);
}

#[test]
fn index_table_chains_recursively() {
    let base = Table::new().into_ref();
    base.borrow_mut().set(Value::from("k"), Value::Integer(99));
    let middle = Table::new().into_ref();
    let middle_mt = Table::new().into_ref();
    middle_mt
        .borrow_mut()
        .set(Value::from("__index"), Value::Table(base));
    middle.borrow_mut().set_metatable(Some(middle_mt));
    let top = Table::new().into_ref();
    let top_mt = Table::new().into_ref();
    top_mt
        .borrow_mut()
        .set(Value::from("__index"), Value::Table(middle));
    top.borrow_mut().set_metatable(Some(top_mt));

    let proto = Prototype {
        max_stack_size: 2,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabc(Opcode::GetTable, 1, 0, rk_constant(1)),
            Instruction::iabc(Opcode::Return, 1, 2, 0),
        ],
        constants: vec![Value::from("t"), Value::from("k")],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    let out = run_with_globals(proto, &[("t", Value::Table(top))]);
    assert_eq!(out, vec![Value::Integer(99)]);
}

#[test]
fn newindex_redirects_absent_keys_only() {
    let backing = Table::new().into_ref();
    let t = Table::new().into_ref();
    t.borrow_mut().set(Value::from("present"), Value::Integer(1));
    let mt = Table::new().into_ref();
    mt.borrow_mut()
        .set(Value::from("__newindex"), Value::Table(backing.clone()));
    t.borrow_mut().set_metatable(Some(mt));

    // t.present = 2; t.absent = 3
    let proto = Prototype {
        max_stack_size: 2,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabc(Opcode::SetTable, 0, rk_constant(1), rk_constant(2)),
            Instruction::iabc(Opcode::SetTable, 0, rk_constant(3), rk_constant(4)),
            Instruction::iabc(Opcode::Return, 0, 1, 0),
        ],
        constants: vec![
            Value::from("t"),
            Value::from("present"),
            Value::Integer(2),
            Value::from("absent"),
            Value::Integer(3),
        ],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    run_with_globals(proto, &[("t", Value::Table(t.clone()))]);

    assert_eq!(t.borrow().get(&Value::from("present")), Value::Integer(2));
    assert_eq!(t.borrow().get(&Value::from("absent")), Value::Nil);
    assert_eq!(
        backing.borrow().get(&Value::from("absent")),
        Value::Integer(3)
    );
}

#[test]
fn call_metafield_splices_the_target_first() {
    let t = Table::new().into_ref();
    let mt = Table::new().into_ref();
    mt.borrow_mut().set(
        Value::from("__call"),
        host(|ls| {
            // (target, arg) -> arg
            ls.push_value(1);
            Ok(1)
        }),
    );
    t.borrow_mut().set_metatable(Some(mt));

    let proto = Prototype {
        max_stack_size: 2,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabx(Opcode::LoadK, 1, 1),
            Instruction::iabc(Opcode::Call, 0, 2, 2),
            Instruction::iabc(Opcode::Return, 0, 2, 0),
        ],
        constants: vec![Value::from("t"), Value::Integer(31)],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    let out = run_with_globals(proto, &[("t", Value::Table(t))]);
    assert_eq!(out, vec![Value::Integer(31)]);
}

#[test]
fn eq_metamethod_applies_to_table_pairs() {
    let lhs = Table::new().into_ref();
    let rhs = Table::new().into_ref();
    let mt = Table::new().into_ref();
    mt.borrow_mut().set(
        Value::from("__eq"),
        host(|ls| {
            ls.push_boolean(true);
            Ok(1)
        }),
    );
    lhs.borrow_mut().set_metatable(Some(mt));

    // return a == b
    let proto = Prototype {
        max_stack_size: 3,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabc(Opcode::GetTabUp, 1, 0, rk_constant(1)),
            Instruction::iabc(Opcode::Eq, 1, 0, 1),
            Instruction::iasbx(Opcode::Jmp, 0, 1),
            Instruction::iabc(Opcode::LoadBool, 2, 0, 1),
            Instruction::iabc(Opcode::LoadBool, 2, 1, 0),
            Instruction::iabc(Opcode::Return, 2, 2, 0),
        ],
        constants: vec![Value::from("a"), Value::from("b")],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    let out = run_with_globals(
        proto,
        &[("a", Value::Table(lhs)), ("b", Value::Table(rhs))],
    );
    assert_eq!(out, vec![Value::Boolean(true)]);
}

#[test]
fn le_is_emulated_with_lt_when_absent() {
    let lhs = Table::new().into_ref();
    let rhs = Table::new().into_ref();
    let mt = Table::new().into_ref();
    // a <= b becomes not (b < a); report b < a as false so a <= b holds
    mt.borrow_mut().set(
        Value::from("__lt"),
        host(|ls| {
            ls.push_boolean(false);
            Ok(1)
        }),
    );
    lhs.borrow_mut().set_metatable(Some(mt.clone()));
    rhs.borrow_mut().set_metatable(Some(mt));

    let proto = Prototype {
        max_stack_size: 3,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabc(Opcode::GetTabUp, 1, 0, rk_constant(1)),
            Instruction::iabc(Opcode::Le, 1, 0, 1),
            Instruction::iasbx(Opcode::Jmp, 0, 1),
            Instruction::iabc(Opcode::LoadBool, 2, 0, 1),
            Instruction::iabc(Opcode::LoadBool, 2, 1, 0),
            Instruction::iabc(Opcode::Return, 2, 2, 0),
        ],
        constants: vec![Value::from("a"), Value::from("b")],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    let out = run_with_globals(
        proto,
        &[("a", Value::Table(lhs)), ("b", Value::Table(rhs))],
    );
    assert_eq!(out, vec![Value::Boolean(true)]);
}

#[test]
fn len_metamethod_overrides_the_border() {
    let t = Table::new().into_ref();
    t.borrow_mut().set(Value::Integer(1), Value::Integer(10));
    let mt = Table::new().into_ref();
    mt.borrow_mut().set(
        Value::from("__len"),
        host(|ls| {
            ls.push_integer(42);
            Ok(1)
        }),
    );
    t.borrow_mut().set_metatable(Some(mt));

    let proto = Prototype {
        max_stack_size: 2,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabc(Opcode::Len, 1, 0, 0),
            Instruction::iabc(Opcode::Return, 1, 2, 0),
        ],
        constants: vec![Value::from("t")],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    let out = run_with_globals(proto, &[("t", Value::Table(t))]);
    assert_eq!(out, vec![Value::Integer(42)]);
}

#[test]
fn setmetatable_and_getmetatable_roundtrip() {
    let mut vm = Interpreter::new();
    vm.open_base();

    vm.get_global("setmetatable").unwrap();
    vm.new_table(); // target
    vm.new_table(); // metatable
    let mt = vm.value_at(-1);
    vm.call(2, 1).unwrap();
    let target = vm.value_at(-1);

    vm.get_global("getmetatable").unwrap();
    vm.push(target);
    vm.call(1, 1).unwrap();
    assert_eq!(vm.value_at(-1), mt);
}

#[test]
fn per_type_metatables_live_in_the_registry() {
    let mut vm = Interpreter::new();
    vm.open_base();

    // setmetatable(5, {__add = ...}) attaches to every number
    vm.get_global("setmetatable").unwrap();
    vm.push_integer(5);
    vm.new_table();
    vm.push(host(|ls| {
        ls.push_string("numeric");
        Ok(1)
    }));
    vm.set_field(-2, "__band").unwrap();
    vm.call(2, 1).unwrap();
    vm.pop(1);

    // now a bitwise op on two booleans still faults, but on numbers the
    // metamethod never fires (raw path wins); check the registry wiring
    // through getmetatable instead
    vm.get_global("getmetatable").unwrap();
    vm.push_number(1.5);
    vm.call(1, 1).unwrap();
    assert!(vm.is_table(-1));
}

#[test]
fn self_resolves_the_method_and_keeps_the_receiver() {
    let obj = Table::new().into_ref();
    obj.borrow_mut().set(
        Value::from("m"),
        host(|ls| {
            // return self
            ls.push_value(0);
            Ok(1)
        }),
    );

    // return obj:m()
    let proto = Prototype {
        max_stack_size: 3,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabc(Opcode::Self_, 1, 0, rk_constant(1)),
            Instruction::iabc(Opcode::Call, 1, 2, 2),
            Instruction::iabc(Opcode::Return, 1, 2, 0),
        ],
        constants: vec![Value::from("obj"), Value::from("m")],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    let out = run_with_globals(proto, &[("obj", Value::Table(obj.clone()))]);
    assert_eq!(out, vec![Value::Table(obj)]);
}
