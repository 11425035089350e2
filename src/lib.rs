
//! Semantic and code-generation core for a microcoded-processor assembler.
//!
//! The front end (lexer/grammar and CLI) and the emission formatting live
//! elsewhere; this crate owns everything between them. A parser drives
//! registration calls into an [`Assembler`]: bit-field names, instruction
//! definitions (whose tags fix each mnemonic's operand/immediate shape),
//! then per section the interleaved instructions and labels, closed off by
//! [`Assembler::finalize_section`], which resolves label references and
//! seals the section. The emission layer then pulls the address-ordered
//! [`Assembler::merged_stream`], encodes each instruction to its 32-bit
//! word, and reads the microcode table off the definition registry.
//!
//! Malformed input is never fatal by itself: every such condition is
//! recorded on one counted warning channel and replaced by a safe default,
//! unless the assembler was built with [`Assembler::strict`], where the
//! first warning aborts.

pub mod bitdef;
pub mod diag;
pub mod encode;
pub mod idef;
pub mod inst;
pub mod layout;
pub mod section;

pub use diag::{Fatal, Reporter, Warning, WarningKind};
pub use idef::{Idef, Idefs, Shape, Tag};
pub use inst::{Immediate, Inst, Label, LabelKind, Operand};
pub use section::{MergedEntry, Section, SectionBase, Sections};

use bitdef::BitDefs;
use layout::Layout;

/// The whole assembler state for one run: the process-scoped registries,
/// the in-flight section layout, and the warning channel.
#[derive(Debug, Default)]
pub struct Assembler {
	bitdefs: BitDefs,
	idefs: Idefs,
	layout: Layout,
	sections: Sections,
	diags: Reporter,
}

impl Assembler {
	pub fn new() -> Self {
		Self::default()
	}

	/// An assembler whose first warning aborts the offending operation.
	pub fn strict() -> Self {
		Self {
			diags: Reporter::strict(),
			..Self::default()
		}
	}

	/* bit definitions */

	pub fn define_bit(&mut self, bit: u64, line: u32) -> Result<u64, Fatal> {
		let mask = bitdef::define_bit(bit, line, &mut self.diags);
		self.diags.check()?;
		Ok(mask)
	}

	pub fn merge_bit(&mut self, mask: u64, bit: u64, line: u32) -> Result<u64, Fatal> {
		let mask = bitdef::merge_bit(mask, bit, line, &mut self.diags);
		self.diags.check()?;
		Ok(mask)
	}

	pub fn merge_masks(&mut self, a: u64, b: u64, line: u32) -> Result<u64, Fatal> {
		let mask = bitdef::merge_masks(a, b, line, &mut self.diags);
		self.diags.check()?;
		Ok(mask)
	}

	pub fn register_bitdef(&mut self, name: &str, mask: u64) {
		self.bitdefs.register(name, mask);
	}

	pub fn lookup_bitdef(&mut self, name: &str, line: u32) -> Result<u64, Fatal> {
		let mask = self.bitdefs.lookup(name, line, &mut self.diags);
		self.diags.check()?;
		Ok(mask)
	}

	pub fn bitdefs(&self) -> &BitDefs {
		&self.bitdefs
	}

	/* instruction definitions */

	pub fn register_idef(&mut self, mnemonic: &str, control_word: u64, tags: Vec<Tag>, line: u32) -> Result<(), Fatal> {
		self.idefs.register(mnemonic, control_word, tags, line, &mut self.diags);
		self.diags.check()
	}

	pub fn set_microcode_bits(&mut self, bits: u64, line: u32) -> Result<(), Fatal> {
		self.idefs.set_microcode_bits(bits, line, &mut self.diags);
		self.diags.check()
	}

	pub fn set_option(&mut self, name: &str, value: u64, line: u32) -> Result<(), Fatal> {
		self.idefs.set_option(name, value, line, &mut self.diags);
		self.diags.check()
	}

	/// Current microcode table width; pair with [`Assembler::idefs`] to emit
	/// the table in opcode order.
	pub fn microcode_bits(&self) -> u64 {
		self.idefs.microcode_bits()
	}

	pub fn idefs(&self) -> &Idefs {
		&self.idefs
	}

	/* section layout */

	pub fn create_offset(&mut self, offset: u64, line: u32) -> Result<u64, Fatal> {
		let offset = inst::create_offset(offset, line, &mut self.diags);
		self.diags.check()?;
		Ok(offset)
	}

	pub fn create_operand(&mut self, base: u64, offset1: u64, offset2: u64, line: u32) -> Result<Option<Operand>, Fatal> {
		let operand = inst::create_operand(base, offset1, offset2, line, &mut self.diags);
		self.diags.check()?;
		Ok(operand)
	}

	pub fn register_inst(
		&mut self,
		mnemonic: &str,
		operands: [Option<Operand>; 3],
		immediate: Immediate,
		line: u32,
	) -> Result<(), Fatal> {
		self.layout.register_inst(mnemonic, operands, immediate, &self.idefs, line, &mut self.diags);
		self.diags.check()
	}

	pub fn register_label(&mut self, name: &str, kind: LabelKind, line: u32) -> Result<(), Fatal> {
		self.layout.register_label(name, kind, line, &mut self.diags);
		self.diags.check()
	}

	pub fn advance_relative(&mut self, count: u64) {
		self.layout.advance_relative(count);
	}

	pub fn set_absolute(&mut self, address: u64, line: u32) -> Result<(), Fatal> {
		self.layout.set_absolute(address, line, &mut self.diags);
		self.diags.check()
	}

	pub fn cursor(&self) -> u64 {
		self.layout.cursor()
	}

	pub fn finalize_section(&mut self, name: Option<&str>, base: SectionBase, line: u32) -> Result<(), Fatal> {
		self.layout.finalize(name, base, &mut self.sections, line, &mut self.diags);
		self.diags.check()
	}

	/* emission */

	pub fn sections(&self) -> &Sections {
		&self.sections
	}

	/// All finalized sections (or just those named `filter`) merged into one
	/// stream, strictly increasing by real address.
	pub fn merged_stream(&mut self, filter: Option<&str>) -> Result<Vec<MergedEntry>, Fatal> {
		let stream = self.sections.merged(filter, &mut self.diags);
		self.diags.check()?;
		Ok(stream)
	}

	pub fn encode(&mut self, inst: &Inst) -> Result<u32, Fatal> {
		let word = encode::encode_instruction(inst, &mut self.diags);
		self.diags.check()?;
		Ok(word)
	}

	/* diagnostics */

	/// Count one syntax error from the front end; too many abort the run.
	pub fn syntax_error(&mut self) -> Result<(), Fatal> {
		self.diags.syntax_error()
	}

	pub fn warnings(&self) -> &[Warning] {
		self.diags.warnings()
	}
}
