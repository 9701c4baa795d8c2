//! End-to-end programs observed through a captured `print`.

use std::cell::RefCell;
use std::rc::Rc;

use crescent_asm::{rk_constant, Instruction, Opcode};
use crescent_vm::prelude::*;

/// Run a prototype with `print` swapped for a collector and return the
/// captured lines.
fn run_and_capture(proto: Prototype) -> Vec<String> {
    let mut vm = Interpreter::new();
    vm.open_base();
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = lines.clone();
    vm.register("print", move |ls| {
        let top = ls.top_index();
        let mut parts = Vec::new();
        for i in 0..=top {
            parts.push(if ls.is_boolean(i) {
                ls.value_at(i).to_string()
            } else if ls.is_string(i) {
                ls.to_string(i)
            } else {
                ls.type_name_at(i).to_string()
            });
        }
        sink.borrow_mut().push(parts.join("\t"));
        Ok(0)
    });
    vm.load_prototype(Rc::new(proto));
    vm.call(0, -1).expect("program should complete");
    let captured = lines.borrow().clone();
    captured
}

fn env_upvalue() -> Vec<UpvalDesc> {
    vec![UpvalDesc {
        in_stack: true,
        index: 0,
    }]
}

#[test]
fn prints_the_float_sum() {
    // print(1 + 2.5)
    let proto = Prototype {
        max_stack_size: 2,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabc(Opcode::Add, 1, rk_constant(1), rk_constant(2)),
            Instruction::iabc(Opcode::Call, 0, 2, 1),
            Instruction::iabc(Opcode::Return, 0, 1, 0),
        ],
        constants: vec![Value::from("print"), Value::Integer(1), Value::Float(2.5)],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    assert_eq!(run_and_capture(proto), vec!["3.5"]);
}

#[test]
fn prints_the_border_and_an_element() {
    // local t = {10,20,30}; print(#t, t[2])
    let proto = Prototype {
        max_stack_size: 4,
        code: vec![
            Instruction::iabc(Opcode::NewTable, 0, 3, 0),
            Instruction::iabx(Opcode::LoadK, 1, 0),
            Instruction::iabx(Opcode::LoadK, 2, 1),
            Instruction::iabx(Opcode::LoadK, 3, 2),
            Instruction::iabc(Opcode::SetList, 0, 3, 1),
            Instruction::iabc(Opcode::GetTabUp, 1, 0, rk_constant(3)),
            Instruction::iabc(Opcode::Len, 2, 0, 0),
            Instruction::iabc(Opcode::GetTable, 3, 0, rk_constant(4)),
            Instruction::iabc(Opcode::Call, 1, 3, 1),
            Instruction::iabc(Opcode::Return, 0, 1, 0),
        ],
        constants: vec![
            Value::Integer(10),
            Value::Integer(20),
            Value::Integer(30),
            Value::from("print"),
            Value::Integer(2),
        ],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    assert_eq!(run_and_capture(proto), vec!["3\t20"]);
}

#[test]
fn prints_the_loop_total() {
    // local s = 0; for i = 1, 4 do s = s + i end; print(s)
    let proto = Prototype {
        max_stack_size: 6,
        code: vec![
            Instruction::iabx(Opcode::LoadK, 0, 0),
            Instruction::iabx(Opcode::LoadK, 1, 1),
            Instruction::iabx(Opcode::LoadK, 2, 2),
            Instruction::iabx(Opcode::LoadK, 3, 1),
            Instruction::iasbx(Opcode::ForPrep, 1, 1),
            Instruction::iabc(Opcode::Add, 0, 0, 4),
            Instruction::iasbx(Opcode::ForLoop, 1, -2),
            Instruction::iabc(Opcode::GetTabUp, 1, 0, rk_constant(3)),
            Instruction::iabc(Opcode::Move, 2, 0, 0),
            Instruction::iabc(Opcode::Call, 1, 2, 1),
            Instruction::iabc(Opcode::Return, 0, 1, 0),
        ],
        constants: vec![
            Value::Integer(0),
            Value::Integer(1),
            Value::Integer(4),
            Value::from("print"),
        ],
        upvalues: env_upvalue(),
        ..Prototype::default()
    };
    assert_eq!(run_and_capture(proto), vec!["10"]);
}

#[test]
fn prints_the_protected_failure() {
    // local ok, err = pcall(function() error("boom") end); print(ok, err)
    let failing = Prototype {
        max_stack_size: 2,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabx(Opcode::LoadK, 1, 1),
            Instruction::iabc(Opcode::Call, 0, 2, 1),
            Instruction::iabc(Opcode::Return, 0, 1, 0),
        ],
        constants: vec![Value::from("error"), Value::from("boom")],
        upvalues: vec![UpvalDesc {
            in_stack: false,
            index: 0,
        }],
        ..Prototype::default()
    };
    let proto = Prototype {
        max_stack_size: 5,
        code: vec![
            Instruction::iabc(Opcode::GetTabUp, 0, 0, rk_constant(0)),
            Instruction::iabx(Opcode::Closure, 1, 0),
            Instruction::iabc(Opcode::Call, 0, 2, 3),
            Instruction::iabc(Opcode::GetTabUp, 2, 0, rk_constant(1)),
            Instruction::iabc(Opcode::Move, 3, 0, 0),
            Instruction::iabc(Opcode::Move, 4, 1, 0),
            Instruction::iabc(Opcode::Call, 2, 3, 1),
            Instruction::iabc(Opcode::Return, 0, 1, 0),
        ],
        constants: vec![Value::from("pcall"), Value::from("print")],
        upvalues: env_upvalue(),
        protos: vec![Rc::new(failing)],
        ..Prototype::default()
    };
    assert_eq!(run_and_capture(proto), vec!["false\tboom"]);
}

#[test]
fn prints_the_add_metamethod_result() {
    // local mt = {__add = function(a, b) return "x" end}
    // local a = setmetatable({}, mt)
    // print(a + 1)
    let handler = Prototype {
        num_params: 2,
        max_stack_size: 3,
        code: vec![
            Instruction::iabx(Opcode::LoadK, 2, 0),
            Instruction::iabc(Opcode::Return, 2, 2, 0),
        ],
        constants: vec![Value::from("x")],
        ..Prototype::default()
    };
    let proto = Prototype {
        max_stack_size: 4,
        code: vec![
            // mt = {}; mt.__add = handler
            Instruction::iabc(Opcode::NewTable, 0, 0, 1),
            Instruction::iabx(Opcode::Closure, 1, 0),
            Instruction::iabc(Opcode::SetTable, 0, rk_constant(0), 1),
            // a = setmetatable({}, mt)
            Instruction::iabc(Opcode::GetTabUp, 1, 0, rk_constant(1)),
            Instruction::iabc(Opcode::NewTable, 2, 0, 0),
            Instruction::iabc(Opcode::Move, 3, 0, 0),
            Instruction::iabc(Opcode::Call, 1, 3, 2),
            // print(a + 1)
            Instruction::iabc(Opcode::GetTabUp, 2, 0, rk_constant(2)),
            Instruction::iabc(Opcode::Add, 3, 1, rk_constant(3)),
            Instruction::iabc(Opcode::Call, 2, 2, 1),
            Instruction::iabc(Opcode::Return, 0, 1, 0),
        ],
        constants: vec![
            Value::from("__add"),
            Value::from("setmetatable"),
            Value::from("print"),
            Value::Integer(1),
        ],
        upvalues: env_upvalue(),
        protos: vec![Rc::new(handler)],
        ..Prototype::default()
    };
    assert_eq!(run_and_capture(proto), vec!["x"]);
}

#[test]
fn prints_the_vararg_count() {
    // local function f() return 1,2,3 end
    // print(select("#", f()))
    let f = Prototype {
        max_stack_size: 3,
        code: vec![
            Instruction::iabx(Opcode::LoadK, 0, 0),
            Instruction::iabx(Opcode::LoadK, 1, 1),
            Instruction::iabx(Opcode::LoadK, 2, 2),
            Instruction::iabc(Opcode::Return, 0, 4, 0),
        ],
        constants: vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)],
        ..Prototype::default()
    };
    let proto = Prototype {
        max_stack_size: 5,
        code: vec![
            Instruction::iabx(Opcode::Closure, 0, 0),
            Instruction::iabc(Opcode::GetTabUp, 1, 0, rk_constant(0)),
            Instruction::iabc(Opcode::GetTabUp, 2, 0, rk_constant(1)),
            Instruction::iabx(Opcode::LoadK, 3, 2),
            Instruction::iabc(Opcode::Move, 4, 0, 0),
            Instruction::iabc(Opcode::Call, 4, 1, 0),
            Instruction::iabc(Opcode::Call, 2, 0, 0),
            Instruction::iabc(Opcode::Call, 1, 0, 1),
            Instruction::iabc(Opcode::Return, 0, 1, 0),
        ],
        constants: vec![Value::from("print"), Value::from("select"), Value::from("#")],
        upvalues: env_upvalue(),
        protos: vec![Rc::new(f)],
        ..Prototype::default()
    };
    assert_eq!(run_and_capture(proto), vec!["3"]);
}
