
use crate::diag::{Reporter, WarningKind};

/// One `key` / `key=value` annotation on an instruction definition.
///
/// A numeric value of zero is a stored value, not an absent one; the two are
/// kept apart by the `Option`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
	name: Box<str>,
	numeric: Option<u64>,
	ident: Option<Box<str>>,
}

impl Tag {
	pub fn empty(name: &str) -> Self {
		Self {
			name: name.into(),
			numeric: None,
			ident: None,
		}
	}

	pub fn numeric(name: &str, value: u64) -> Self {
		Self {
			name: name.into(),
			numeric: Some(value),
			ident: None,
		}
	}

	pub fn ident(name: &str, value: &str) -> Self {
		Self {
			name: name.into(),
			numeric: None,
			ident: Some(value.into()),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

/// Operand/immediate arity an instruction must be registered with, derived
/// from the definition's tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
	pub operand_count: u64,
	pub immediate_count: u64,
	pub label_allowed: bool,
}

/// A registered instruction definition.
///
/// The opcode doubles as the definition's index in the registry; the
/// microcode table is addressed the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Idef {
	mnemonic: Box<str>,
	control_word: u64,
	opcode: u64,
	tags: Vec<Tag>,
}

impl Idef {
	pub fn mnemonic(&self) -> &str {
		&self.mnemonic
	}

	/// The microcode table entry for this definition.
	pub fn control_word(&self) -> u64 {
		self.control_word
	}

	pub fn opcode(&self) -> u64 {
		self.opcode
	}

	pub fn tags(&self) -> &[Tag] {
		&self.tags
	}

	fn tag(&self, name: &str) -> Option<&Tag> {
		self.tags.iter().find(|t| t.name.as_ref() == name)
	}

	/// Derive the expected shape from the tags.
	///
	/// Computed on demand rather than stored, so the tags stay inspectable
	/// with different defaults. Unknown tags are inert.
	pub fn shape(&self) -> Shape {
		let mut shape = Shape {
			operand_count: 3,
			immediate_count: 0,
			label_allowed: true,
		};

		if let Some(tag) = self.tag("op") {
			if let Some(n) = tag.numeric {
				shape.operand_count = n;
			}
		}

		if let Some(tag) = self.tag("imm") {
			if let Some(n) = tag.numeric {
				if n >= 1 {
					shape.immediate_count = n;
				}
			} else if let Some(ident) = &tag.ident {
				if ident.as_ref() == "short" {
					shape.immediate_count = 1;
				} else if ident.as_ref() == "long" {
					shape.immediate_count = 2;
				}
			}

			shape.operand_count = shape.operand_count.saturating_sub(shape.immediate_count);
		}

		if self.tag("nolabel").is_some() {
			shape.label_allowed = false;
		}

		shape
	}
}

fn fits(word: u64, width: u64) -> bool {
	width >= 64 || word >> width == 0
}

/// Append-only mnemonic → definition registry, plus the running microcode
/// table width.
#[derive(Debug, Default)]
pub struct Idefs {
	defs: Vec<Idef>,
	max_bits: u64,
}

impl Idefs {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a definition; its opcode is the registration index.
	///
	/// A control word too wide for the current table grows the width until
	/// it holds, with a warning, since that silently widens every entry.
	pub fn register(&mut self, mnemonic: &str, control_word: u64, tags: Vec<Tag>, line: u32, diags: &mut Reporter) {
		if !fits(control_word, self.max_bits) {
			diags.warn(WarningKind::GrowsMicrocodeWidth { width: self.max_bits }, Some(line));

			while !fits(control_word, self.max_bits) {
				self.max_bits += 1;
			}
		}

		self.defs.push(Idef {
			mnemonic: mnemonic.into(),
			control_word,
			opcode: self.defs.len() as u64,
			tags,
		});
	}

	pub fn lookup(&self, mnemonic: &str) -> Option<&Idef> {
		self.defs.iter().find(|d| d.mnemonic.as_ref() == mnemonic)
	}

	pub fn get(&self, opcode: u64) -> Option<&Idef> {
		self.defs.get(opcode as usize)
	}

	/// Width of every microcode table entry, in bits. Only grows through
	/// registration; an explicit override may shrink it.
	pub fn microcode_bits(&self) -> u64 {
		self.max_bits
	}

	/// Explicit width override; last write wins, shrinking is warned.
	pub fn set_microcode_bits(&mut self, bits: u64, line: u32, diags: &mut Reporter) {
		if self.max_bits > bits {
			diags.warn(
				WarningKind::ShrinksMicrocodeWidth { width: self.max_bits, requested: bits },
				Some(line),
			);
		}

		self.max_bits = bits;
	}

	/// Generic option surface for the front end's `option` directive.
	pub fn set_option(&mut self, name: &str, value: u64, line: u32, diags: &mut Reporter) {
		if name == "bits" {
			self.set_microcode_bits(value, line, diags);
		} else {
			diags.warn(WarningKind::UnknownOption { name: name.into() }, Some(line));
		}
	}

	/// Definitions in registration (= opcode) order, for microcode emission.
	pub fn iter(&self) -> impl Iterator<Item = &Idef> {
		self.defs.iter()
	}

	pub fn len(&self) -> usize {
		self.defs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.defs.is_empty()
	}
}
