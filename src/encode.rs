
use crate::diag::{Reporter, WarningKind};
use crate::inst::{Immediate, Inst, Operand};

/// Width of the opcode field.
pub const OPCODE_BITS: u64 = 11;

const SINGLE_MAX: u64 = 0x7F;
const DOUBLE_MAX: u64 = 0x3FFF;

/// Pack an operand's offsets into the 3-bit offset field.
///
/// Offsets arrive pre-incremented (0 = absent), and the three addressing
/// depths share overlapping numeric ranges:
///
/// ```text
///   0       | no offset
///   1..=2   | one offset, value = field - 1
///   3..=4   | two offsets, first = 0, second = field - 3
///   5..=6   | two offsets, first = 1, second = field - 5
/// ```
///
/// Decoders depend on these exact ranges.
pub fn encode_offset(operand: &Operand) -> u64 {
	if operand.offset2 == 0 {
		operand.offset1
	} else if operand.offset1 == 1 {
		2 + operand.offset2
	} else {
		4 + operand.offset2
	}
}

/// Encode one instruction into its 32-bit word.
///
/// ```text
///   [ 0: 3] | operand 1 base      [ 4: 6] | operand 1 offsets
///   [ 7:10] | operand 2 base      [11:13] | operand 2 offsets
///   [14:17] | operand 3 base      [18:20] | operand 3 offsets
///   [14:20] | single immediate (replaces operand 3)
///   [ 7:20] | double immediate / resolved label (replaces operands 2-3)
///   [21:31] | opcode
/// ```
///
/// Immediates wider than their field saturate to the field maximum, with a
/// warning naming the source label when there is one.
pub fn encode_instruction(inst: &Inst, diags: &mut Reporter) -> u32 {
	let mut word = 0u64;

	if let Some(op) = &inst.operands[0] {
		word |= op.base;
		word |= encode_offset(op) << 4;
	}

	match &inst.immediate {
		Immediate::None => {
			if let Some(op) = &inst.operands[1] {
				word |= op.base << 7;
				word |= encode_offset(op) << 11;
			}
			if let Some(op) = &inst.operands[2] {
				word |= op.base << 14;
				word |= encode_offset(op) << 18;
			}
		}
		Immediate::Single(value) => {
			if let Some(op) = &inst.operands[1] {
				word |= op.base << 7;
				word |= encode_offset(op) << 11;
			}
			word |= cap(*value, SINGLE_MAX, None, diags) << 14;
		}
		Immediate::Double(value) => {
			word |= cap(*value, DOUBLE_MAX, None, diags) << 7;
		}
		Immediate::Global { name, value } | Immediate::Local { name, value } => {
			word |= cap(*value, DOUBLE_MAX, Some(name), diags) << 7;
		}
	}

	word |= (inst.opcode() & ((1 << OPCODE_BITS) - 1)) << 21;

	word as u32
}

fn cap(value: u64, limit: u64, name: Option<&str>, diags: &mut Reporter) -> u64 {
	if value > limit {
		diags.warn(
			WarningKind::ImmediateOverflow { value, limit, name: name.map(Into::into) },
			None,
		);
		return limit;
	}

	value
}
