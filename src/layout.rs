
use std::mem;

use tracing::{instrument, trace};

use crate::diag::{Reporter, WarningKind};
use crate::idef::{Idef, Idefs};
use crate::inst::{Immediate, Inst, Label, LabelKind, Operand};
use crate::section::{Section, SectionBase, Sections};

/// Per-section layout state: the address cursor and the pending
/// instructions and labels, all reset when the section is finalized.
#[derive(Debug, Default)]
pub struct Layout {
	cursor: u64,
	insts: Vec<Inst>,
	labels: Vec<Label>,
}

impl Layout {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cursor(&self) -> u64 {
		self.cursor
	}

	/// Register one instruction at the current cursor.
	///
	/// The cursor advances whether or not the instruction survives, so a
	/// discarded instruction leaves its address reserved.
	pub fn register_inst(
		&mut self,
		mnemonic: &str,
		operands: [Option<Operand>; 3],
		immediate: Immediate,
		idefs: &Idefs,
		line: u32,
		diags: &mut Reporter,
	) {
		let address = self.cursor;
		self.cursor += 1;

		let Some(def) = idefs.lookup(mnemonic) else {
			diags.warn(WarningKind::UnknownMnemonic { name: mnemonic.into() }, Some(line));
			return;
		};

		let inst = Inst {
			def: def.opcode(),
			address,
			operands,
			immediate,
		};

		if !verify(&inst, def, line, diags) {
			return;
		}

		trace!("registered '{mnemonic}' @ {address}");
		self.insts.push(inst);
	}

	/// Register a label at the current cursor address.
	pub fn register_label(&mut self, name: &str, kind: LabelKind, line: u32, diags: &mut Reporter) {
		match kind {
			LabelKind::Global => {
				trace!("global label '{name}' @ {}", self.cursor);
				self.labels.push(Label::new(name, self.cursor));
			}
			LabelKind::Local => match self.labels.last_mut() {
				Some(parent) => {
					trace!("local label '{name}' @ {}", self.cursor);
					parent.locals.push(Label::new(name, self.cursor));
				}
				None => {
					diags.warn(WarningKind::OrphanLocalLabel { name: name.into() }, Some(line));
				}
			},
		}
	}

	/// Move the cursor forward by `count` addresses.
	pub fn advance_relative(&mut self, count: u64) {
		self.cursor += count;
	}

	/// Jump the cursor to an absolute address. Moving backward is refused.
	pub fn set_absolute(&mut self, address: u64, line: u32, diags: &mut Reporter) {
		if address < self.cursor {
			diags.warn(WarningKind::BackwardAddress { address, cursor: self.cursor }, Some(line));
		} else {
			self.cursor = address;
		}
	}

	/// Seal the pending state into a section and reset for the next one.
	///
	/// Resolves the base address against previously registered sections,
	/// then runs the label-resolution pass over the pending instructions
	/// before handing the section to the registry.
	#[instrument(skip_all, fields(section = name.unwrap_or("*auto")))]
	pub fn finalize(
		&mut self,
		name: Option<&str>,
		base: SectionBase,
		sections: &mut Sections,
		line: u32,
		diags: &mut Reporter,
	) {
		let name = match name {
			Some(name) => name.to_owned(),
			None => sections.auto_name(),
		};

		let base = sections.resolve_base(&name, &base, line, diags);

		let size = self.cursor;
		let mut insts = mem::take(&mut self.insts);
		let labels = mem::take(&mut self.labels);
		self.cursor = 0;

		resolve_labels(&mut insts, &labels, &name, line, diags);

		sections.push(Section {
			name: name.into(),
			base,
			size,
			insts,
			labels,
		});
	}
}

fn verify(inst: &Inst, def: &Idef, line: u32, diags: &mut Reporter) -> bool {
	let shape = def.shape();
	let operands = inst.operands.iter().filter(|o| o.is_some()).count() as u64;

	if operands != shape.operand_count {
		diags.warn(WarningKind::OperandCount { mnemonic: def.mnemonic().into() }, Some(line));
		return false;
	}

	if inst.immediate.arity() != shape.immediate_count {
		diags.warn(WarningKind::ImmediateArity { mnemonic: def.mnemonic().into() }, Some(line));
		return false;
	}

	if !shape.label_allowed && inst.immediate.is_label_ref() {
		diags.warn(WarningKind::LabelNotAllowed { mnemonic: def.mnemonic().into() }, Some(line));
		return false;
	}

	true
}

/// Fill in the numeric address of every label-reference immediate.
///
/// Walks instructions in registration order with a label cursor that passes
/// every label at or before the instruction's address; a local reference
/// only sees the chain of the last global label passed.
fn resolve_labels(insts: &mut [Inst], labels: &[Label], section: &str, line: u32, diags: &mut Reporter) {
	let mut next = 0;
	let mut parent: Option<&Label> = None;

	for inst in insts {
		while next < labels.len() && labels[next].address() <= inst.address {
			parent = Some(&labels[next]);
			next += 1;
		}

		match &mut inst.immediate {
			Immediate::Global { name, value } => {
				match labels.iter().find(|l| l.name() == name.as_ref()) {
					Some(label) => *value = label.address(),
					None => {
						diags.warn(
							WarningKind::UnknownLabel { name: name.clone(), section: section.into() },
							Some(line),
						);
						*value = 0;
					}
				}
			}
			Immediate::Local { name, value } => {
				match parent.and_then(|p| p.lookup_local(name)) {
					Some(label) => *value = label.address(),
					None => {
						diags.warn(
							WarningKind::UnknownLocalLabel { name: name.clone(), section: section.into() },
							Some(line),
						);
						*value = 0;
					}
				}
			}
			_ => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use test_log::test;

	use super::*;
	use crate::idef::Tag;

	fn idefs() -> Idefs {
		let mut diags = Reporter::new();
		let mut idefs = Idefs::new();
		// three plain operands
		idefs.register("add", 0b001, vec![], 1, &mut diags);
		// one operand and a 14-bit immediate or label
		idefs.register("jmp", 0b010, vec![Tag::ident("imm", "long")], 2, &mut diags);
		// one operand and a 14-bit immediate, labels forbidden
		idefs.register("lui", 0b011, vec![Tag::ident("imm", "long"), Tag::empty("nolabel")], 3, &mut diags);
		// no operands
		idefs.register("halt", 0b100, vec![Tag::numeric("op", 0)], 4, &mut diags);
		idefs
	}

	fn reg(base: u64) -> Option<Operand> {
		let mut diags = Reporter::new();
		crate::inst::create_operand(base, 0, 0, 1, &mut diags)
	}

	#[test]
	fn addresses_follow_registration_order() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		for line in 1..=3 {
			layout.register_inst("add", [reg(1), reg(2), reg(3)], Immediate::None, &idefs, line, &mut diags);
		}
		let addresses: Vec<u64> = layout.insts.iter().map(|i| i.address).collect();
		assert_eq!(addresses, vec![0, 1, 2]);
		assert_eq!(layout.cursor(), 3);
	}

	#[test]
	fn unknown_mnemonic_still_reserves_its_address() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		layout.register_inst("bogus", [None, None, None], Immediate::None, &idefs, 1, &mut diags);
		layout.register_inst("halt", [None, None, None], Immediate::None, &idefs, 2, &mut diags);
		assert_eq!(diags.warning_count(), 1);
		assert_eq!(layout.insts.len(), 1);
		assert_eq!(layout.insts[0].address, 1);
	}

	#[test]
	fn operand_count_mismatch_discards_but_advances() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		layout.register_inst("add", [reg(1), None, None], Immediate::None, &idefs, 1, &mut diags);
		assert_eq!(diags.warning_count(), 1);
		assert!(layout.insts.is_empty());
		assert_eq!(layout.cursor(), 1);
	}

	#[test]
	fn immediate_arity_mismatch_discards() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		layout.register_inst("jmp", [reg(1), None, None], Immediate::None, &idefs, 1, &mut diags);
		assert_eq!(diags.warning_count(), 1);
		assert!(layout.insts.is_empty());
	}

	#[test]
	fn label_reference_needs_permission() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		layout.register_inst("lui", [reg(1), None, None], Immediate::global("start"), &idefs, 1, &mut diags);
		assert_eq!(diags.warning_count(), 1);
		assert!(layout.insts.is_empty());

		layout.register_inst("lui", [reg(1), None, None], Immediate::Double(40), &idefs, 2, &mut diags);
		assert_eq!(layout.insts.len(), 1);
	}

	#[test]
	fn local_label_needs_a_global_parent() {
		let mut diags = Reporter::new();
		let mut layout = Layout::new();
		layout.register_label(".loop", LabelKind::Local, 1, &mut diags);
		assert_eq!(diags.warning_count(), 1);
		assert!(layout.labels.is_empty());

		layout.register_label("main", LabelKind::Global, 2, &mut diags);
		layout.register_label(".loop", LabelKind::Local, 3, &mut diags);
		layout.register_label(".done", LabelKind::Local, 4, &mut diags);
		assert_eq!(layout.labels.len(), 1);
		assert_eq!(layout.labels[0].locals().len(), 2);
	}

	#[test]
	fn absolute_moves_only_forward() {
		let mut diags = Reporter::new();
		let mut layout = Layout::new();
		layout.advance_relative(4);
		layout.set_absolute(10, 1, &mut diags);
		assert_eq!(layout.cursor(), 10);

		layout.set_absolute(2, 2, &mut diags);
		assert_eq!(layout.cursor(), 10);
		assert_eq!(diags.warning_count(), 1);
	}

	#[test]
	fn finalize_resolves_global_forward_references() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		let mut sections = Sections::new();

		layout.register_inst("jmp", [reg(0), None, None], Immediate::global("end"), &idefs, 1, &mut diags);
		layout.register_label("end", LabelKind::Global, 2, &mut diags);
		layout.finalize(Some("code"), SectionBase::Absolute(0), &mut sections, 3, &mut diags);

		assert_eq!(diags.warning_count(), 0);
		let section = sections.lookup("code").unwrap();
		assert_eq!(
			section.insts()[0].immediate(),
			&Immediate::Global { name: "end".into(), value: 1 },
		);
	}

	#[test]
	fn finalize_resolves_local_within_last_global() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		let mut sections = Sections::new();

		layout.set_absolute(5, 1, &mut diags);
		layout.register_label("main", LabelKind::Global, 1, &mut diags);
		layout.set_absolute(6, 2, &mut diags);
		layout.register_label(".a", LabelKind::Local, 2, &mut diags);
		layout.set_absolute(7, 3, &mut diags);
		layout.register_inst("jmp", [reg(0), None, None], Immediate::local(".a"), &idefs, 3, &mut diags);
		layout.finalize(Some("code"), SectionBase::Absolute(0), &mut sections, 4, &mut diags);

		assert_eq!(diags.warning_count(), 0);
		let section = sections.lookup("code").unwrap();
		assert_eq!(
			section.insts()[0].immediate(),
			&Immediate::Local { name: ".a".into(), value: 6 },
		);
	}

	#[test]
	fn local_reference_cannot_see_a_later_chain() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		let mut sections = Sections::new();

		layout.register_inst("jmp", [reg(0), None, None], Immediate::local(".a"), &idefs, 1, &mut diags);
		layout.register_label("main", LabelKind::Global, 2, &mut diags);
		layout.register_label(".a", LabelKind::Local, 3, &mut diags);
		layout.finalize(Some("code"), SectionBase::Absolute(0), &mut sections, 4, &mut diags);

		// the instruction at 0 precedes the global at 1, so the chain is
		// not in scope and the reference falls back to 0
		assert_eq!(diags.warning_count(), 1);
		let section = sections.lookup("code").unwrap();
		assert_eq!(
			section.insts()[0].immediate(),
			&Immediate::Local { name: ".a".into(), value: 0 },
		);
	}

	#[test]
	fn unresolved_reference_becomes_zero_with_warning() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		let mut sections = Sections::new();

		layout.register_inst("jmp", [reg(0), None, None], Immediate::global("nowhere"), &idefs, 1, &mut diags);
		layout.finalize(Some("code"), SectionBase::Absolute(0), &mut sections, 2, &mut diags);

		assert_eq!(diags.warning_count(), 1);
		let section = sections.lookup("code").unwrap();
		assert_eq!(
			section.insts()[0].immediate(),
			&Immediate::Global { name: "nowhere".into(), value: 0 },
		);
	}

	#[test]
	fn finalize_resets_layout_state() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		let mut sections = Sections::new();

		layout.register_inst("halt", [None, None, None], Immediate::None, &idefs, 1, &mut diags);
		layout.register_label("main", LabelKind::Global, 1, &mut diags);
		layout.finalize(None, SectionBase::Absolute(0), &mut sections, 2, &mut diags);

		assert_eq!(layout.cursor(), 0);
		assert!(layout.insts.is_empty());
		assert!(layout.labels.is_empty());
	}

	#[test]
	fn anonymous_sections_are_auto_named() {
		let mut diags = Reporter::new();
		let mut layout = Layout::new();
		let mut sections = Sections::new();

		layout.finalize(None, SectionBase::Absolute(0), &mut sections, 1, &mut diags);
		layout.finalize(None, SectionBase::AfterPrevious, &mut sections, 2, &mut diags);

		assert!(sections.lookup("*auto-0").is_some());
		assert!(sections.lookup("*auto-1").is_some());
	}

	#[test]
	fn section_size_is_the_final_cursor() {
		let mut diags = Reporter::new();
		let idefs = idefs();
		let mut layout = Layout::new();
		let mut sections = Sections::new();

		layout.register_inst("halt", [None, None, None], Immediate::None, &idefs, 1, &mut diags);
		layout.advance_relative(7);
		layout.finalize(Some("padded"), SectionBase::Absolute(0), &mut sections, 2, &mut diags);

		assert_eq!(sections.lookup("padded").map(Section::size), Some(8));
	}
}
