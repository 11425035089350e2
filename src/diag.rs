
use std::fmt;

use miette::Diagnostic;
use thiserror::Error;
use tracing::warn;

/// Syntax errors tolerated from the front end before giving up.
const MAX_SYNTAX_ERRORS: u32 = 5;

/// A recoverable condition, with whatever context it was detected with.
///
/// Every kind has a safe default the caller substitutes (zero, cap at
/// maximum, or discard) so processing always continues unless the reporter
/// is in strict mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
	/* bit definitions */
	BitRange { bit: u64 },
	RedundantBit { bit: u64 },
	RedundantMask,
	UnknownBitDef { name: Box<str> },

	/* instruction definitions */
	GrowsMicrocodeWidth { width: u64 },
	ShrinksMicrocodeWidth { width: u64, requested: u64 },
	UnknownOption { name: Box<str> },

	/* operands and instructions */
	BaseRange { base: u64 },
	OffsetRange { offset: u64 },
	UnknownMnemonic { name: Box<str> },
	OperandCount { mnemonic: Box<str> },
	ImmediateArity { mnemonic: Box<str> },
	LabelNotAllowed { mnemonic: Box<str> },

	/* labels and layout */
	OrphanLocalLabel { name: Box<str> },
	BackwardAddress { address: u64, cursor: u64 },

	/* sections */
	NoPreviousSection { section: Box<str> },
	UnknownBaseSection { name: Box<str> },
	UnknownLabel { name: Box<str>, section: Box<str> },
	UnknownLocalLabel { name: Box<str>, section: Box<str> },
	AddressConflict { address: u64 },

	/* encoding */
	ImmediateOverflow { value: u64, limit: u64, name: Option<Box<str>> },
}

/// One recorded warning: the condition plus the source line the front end
/// reported it from, when there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
	pub kind: WarningKind,
	pub line: Option<u32>,
}

impl fmt::Display for Warning {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		use WarningKind as K;

		match &self.kind {
			K::BitRange { bit } =>
				write!(f, "bit {bit} beyond allowed maximum, treating as 0")?,
			K::RedundantBit { bit } =>
				write!(f, "redundant bit {bit}, ignoring")?,
			K::RedundantMask =>
				write!(f, "redundant bits in mask merge, ignoring")?,
			K::UnknownBitDef { name } =>
				write!(f, "unknown bit definition '{name}', treating as null")?,
			K::GrowsMicrocodeWidth { width } =>
				write!(f, "definition implicitly increases microcode width above {width}")?,
			K::ShrinksMicrocodeWidth { width, requested } =>
				write!(f, "requested microcode width {requested} below current {width}")?,
			K::UnknownOption { name } =>
				write!(f, "unknown option '{name}'")?,
			K::BaseRange { base } =>
				write!(f, "base register {base} exceeds maximum, ignoring operand")?,
			K::OffsetRange { offset } =>
				write!(f, "offset {offset} exceeds maximum, capping")?,
			K::UnknownMnemonic { name } =>
				write!(f, "no definition found for instruction '{name}', ignoring")?,
			K::OperandCount { mnemonic } =>
				write!(f, "incorrect number of operands for '{mnemonic}'")?,
			K::ImmediateArity { mnemonic } =>
				write!(f, "incorrect immediate type for '{mnemonic}'")?,
			K::LabelNotAllowed { mnemonic } =>
				write!(f, "label not allowed as immediate for '{mnemonic}'")?,
			K::OrphanLocalLabel { name } =>
				write!(f, "local label '{name}' without parent, ignoring")?,
			K::BackwardAddress { address, cursor } =>
				write!(f, "absolute address {address} behind current address {cursor}, ignoring")?,
			K::NoPreviousSection { section } =>
				write!(f, "section '{section}' is relative without a prior section, assuming base 0")?,
			K::UnknownBaseSection { name } =>
				write!(f, "section '{name}' not found prior to use as relative base, assuming 0")?,
			K::UnknownLabel { name, section } =>
				write!(f, "no label '{name}' in section '{section}', treating as 0")?,
			K::UnknownLocalLabel { name, section } =>
				write!(f, "no local label '{name}' in section '{section}', treating as 0")?,
			K::AddressConflict { address } =>
				write!(f, "conflicting instructions at address {address}")?,
			K::ImmediateOverflow { value, limit, name: Some(name) } =>
				write!(f, "immediate '{name}' = {value} exceeds maximum {limit}, capping")?,
			K::ImmediateOverflow { value, limit, name: None } =>
				write!(f, "immediate {value} exceeds maximum {limit}, capping")?,
		}

		if let Some(line) = self.line {
			write!(f, " (line {line})")?;
		}
		Ok(())
	}
}

/// Conditions that abort processing outright.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum Fatal {
	/// Strict mode promoted a recoverable warning.
	#[error("warning treated as error: {0}")]
	#[diagnostic(code(mcasm::warning_as_error))]
	WarningAsError(Warning),

	/// The front end reported more syntax errors than worth continuing for.
	#[error("error count exceeded threshold, aborting")]
	#[diagnostic(code(mcasm::too_many_errors))]
	TooManyErrors,
}

/// The single counted channel every recoverable condition goes through.
///
/// Leaf operations only record; the context checks the strict-mode policy
/// after each public operation, so the first warning recorded under strict
/// mode aborts that operation.
#[derive(Debug, Default)]
pub struct Reporter {
	warnings: Vec<Warning>,
	fatal_warnings: bool,
	syntax_errors: u32,
}

impl Reporter {
	pub fn new() -> Self {
		Self::default()
	}

	/// A reporter whose first warning becomes fatal.
	pub fn strict() -> Self {
		Self {
			fatal_warnings: true,
			..Self::default()
		}
	}

	pub(crate) fn warn(&mut self, kind: WarningKind, line: Option<u32>) {
		let warning = Warning { kind, line };
		warn!("{warning}");
		self.warnings.push(warning);
	}

	/// Strict-mode policy check, run by the context after each operation.
	pub(crate) fn check(&self) -> Result<(), Fatal> {
		match self.warnings.first() {
			Some(w) if self.fatal_warnings => Err(Fatal::WarningAsError(w.clone())),
			_ => Ok(()),
		}
	}

	/// Count one syntax error from the front end.
	pub(crate) fn syntax_error(&mut self) -> Result<(), Fatal> {
		self.syntax_errors += 1;
		if self.syntax_errors > MAX_SYNTAX_ERRORS {
			Err(Fatal::TooManyErrors)
		} else {
			Ok(())
		}
	}

	pub fn warnings(&self) -> &[Warning] {
		&self.warnings
	}

	pub fn warning_count(&self) -> usize {
		self.warnings.len()
	}
}
