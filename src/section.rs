
use tracing::debug;

use crate::diag::{Reporter, WarningKind};
use crate::inst::{Inst, Label};

/// How a section's base address is specified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionBase {
	Absolute(u64),
	/// Immediately after the previously registered section.
	AfterPrevious,
	/// Immediately after the most recent section with this name.
	AfterNamed(Box<str>),
}

/// A finalized, sealed block of instructions and labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
	pub(crate) name: Box<str>,
	pub(crate) base: u64,
	pub(crate) size: u64,
	pub(crate) insts: Vec<Inst>,
	pub(crate) labels: Vec<Label>,
}

impl Section {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn base(&self) -> u64 {
		self.base
	}

	/// Address span of the section: the layout cursor at finalization, gaps
	/// included.
	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn insts(&self) -> &[Inst] {
		&self.insts
	}

	pub fn labels(&self) -> &[Label] {
		&self.labels
	}
}

/// One instruction of the merged stream, placed at its real address.
///
/// `gap` counts the unoccupied addresses between this entry and the one
/// before it, for the emission layer's fill directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
	pub inst: Inst,
	pub real_address: u64,
	pub gap: u64,
}

/// Registry of finalized sections, in registration order.
#[derive(Debug, Default)]
pub struct Sections {
	sections: Vec<Section>,
}

impl Sections {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn push(&mut self, section: Section) {
		debug!("section '{}' registered: base {}, size {}", section.name, section.base, section.size);
		self.sections.push(section);
	}

	/// Name for the next anonymous section.
	pub(crate) fn auto_name(&self) -> String {
		format!("*auto-{}", self.sections.len())
	}

	/// Resolve a base specification against the sections registered so far.
	pub(crate) fn resolve_base(&self, name: &str, base: &SectionBase, line: u32, diags: &mut Reporter) -> u64 {
		match base {
			SectionBase::Absolute(address) => *address,
			SectionBase::AfterPrevious => match self.sections.last() {
				Some(prev) => prev.base + prev.size,
				None => {
					diags.warn(WarningKind::NoPreviousSection { section: name.into() }, Some(line));
					0
				}
			},
			SectionBase::AfterNamed(base_name) => match self.lookup_most_recent(base_name) {
				Some(prev) => prev.base + prev.size,
				None => {
					diags.warn(WarningKind::UnknownBaseSection { name: base_name.clone() }, Some(line));
					0
				}
			},
		}
	}

	/// First section registered with this name.
	pub fn lookup(&self, name: &str) -> Option<&Section> {
		self.sections.iter().find(|s| s.name.as_ref() == name)
	}

	/// Last section registered with this name; relative bases use this so a
	/// re-used name picks the latest.
	pub fn lookup_most_recent(&self, name: &str) -> Option<&Section> {
		self.sections.iter().rev().find(|s| s.name.as_ref() == name)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Section> {
		self.sections.iter()
	}

	pub fn len(&self) -> usize {
		self.sections.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sections.is_empty()
	}

	/// Merge sections into one stream strictly increasing by real address.
	///
	/// Two instructions landing on the same address conflict; the one seen
	/// first in merge order stays, the other is dropped with a warning.
	pub fn merged(&self, filter: Option<&str>, diags: &mut Reporter) -> Vec<MergedEntry> {
		let mut ordered: Vec<(u64, &Inst)> = Vec::new();

		for section in &self.sections {
			if filter.is_some_and(|name| section.name.as_ref() != name) {
				continue;
			}

			for inst in &section.insts {
				let address = section.base + inst.address;
				match ordered.binary_search_by_key(&address, |&(a, _)| a) {
					Ok(_) => diags.warn(WarningKind::AddressConflict { address }, None),
					Err(pos) => ordered.insert(pos, (address, inst)),
				}
			}
		}

		let mut stream = Vec::with_capacity(ordered.len());
		let mut prev = None;

		for (address, inst) in ordered {
			let gap = match prev {
				Some(prev) => address - prev - 1,
				None => 0,
			};
			stream.push(MergedEntry {
				inst: inst.clone(),
				real_address: address,
				gap,
			});
			prev = Some(address);
		}

		stream
	}
}
