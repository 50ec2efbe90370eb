//! Per-opcode gas costs.
//!
//! Billing is flat per opcode and only active when a gas limit is set.
//! Unknown opcodes never reach billing; the engine faults on them first.

use mtoken_asm::OpcodeRepr;

/// Gas charged for one execution of `op`.
pub const fn cost(op: OpcodeRepr) -> u64 {
    use OpcodeRepr::*;

    match op {
        B | E | FN | PH | HALT | STEP | DO => 0,

        ADD | SUB | AND | OR | XOR | SHL | SHR => 1,
        LT | GT | LE | GE | EQ | NEQ | NEG | NOT => 1,
        DUP | DRP | ROT | SWP | SWP_ALIAS => 1,
        IF | WH | FR | JMP | JZ | JNZ | DWHL | WHIL => 1,
        GTWAY | WAIT | TRACE | BP => 1,

        LIT | V | LET => 2,
        LEN | GET | GET_ALIAS | IDX | RT | FREE => 2,

        SET | MUL | PUT | PUT_ALIAS | STO | IOR => 3,

        DIV | MOD | CL | IOW | ALLOC | NEWARR => 5,

        // Collection walks every root and allocation.
        GC => 10,
    }
}
