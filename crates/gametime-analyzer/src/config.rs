//! Analyzer configuration

use serde::{Deserialize, Serialize};

/// Byte order of the analysis target. Decides the field order of
/// concatenations synthesized for aggregate accesses that span fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    Little,
    Big,
}

/// How array variables are modelled in the emitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayModel {
    /// `(Array idx (Array idx elem))` — one array sort per index level.
    Nested,
    /// One array sort whose index is the concatenation of all index levels.
    Flat,
}

/// Configuration of the path analyzer and the SMT lowering.
///
/// The identifier fields are the textual prefixes used for synthesized
/// names; they exist so that downstream model parsers can recognize what
/// the analyzer invented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Machine word size in bits. Comparisons and synthesized indices are
    /// this wide.
    pub word_bits: u32,
    pub endianness: Endianness,
    /// Prefix of the per-condition constraint booleans in the query.
    pub ident_constraint: String,
    /// Prefix of fresh temporary variables (function formals).
    pub ident_temp_var: String,
    /// Prefix of the temporaries that replace array index expressions.
    pub ident_temp_index: String,
    /// Prefix of the temporary pointers synthesized for address-taken
    /// variables.
    pub ident_temp_ptr: String,
    /// Prefix of per-field array variables for aggregate accesses.
    pub ident_field: String,
    /// Infix tag joining a field name to its aggregate type name.
    pub ident_aggregate: String,
    /// Prefix of the symbolic values standing in for external function
    /// calls.
    pub ident_efc: String,
    /// Name of the `assume` annotation function.
    pub annotation_assume: String,
    /// Name of the `simulate` annotation function.
    pub annotation_simulate: String,
    pub array_model: ArrayModel,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            word_bits: 32,
            endianness: Endianness::Little,
            ident_constraint: "gtCONSTRAINT".to_string(),
            ident_temp_var: "__gtTEMP".to_string(),
            ident_temp_index: "__gtINDEX".to_string(),
            ident_temp_ptr: "__gtPTR".to_string(),
            ident_field: "gtFIELD_".to_string(),
            ident_aggregate: "_gtAGG_".to_string(),
            ident_efc: "gtEFC_".to_string(),
            annotation_assume: "gt_assume".to_string(),
            annotation_simulate: "gt_simulate".to_string(),
            array_model: ArrayModel::Nested,
        }
    }
}

impl AnalyzerConfig {
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder::default()
    }
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug, Default)]
pub struct AnalyzerConfigBuilder {
    word_bits: Option<u32>,
    endianness: Option<Endianness>,
    array_model: Option<ArrayModel>,
    annotation_assume: Option<String>,
    annotation_simulate: Option<String>,
}

impl AnalyzerConfigBuilder {
    pub fn word_bits(mut self, value: u32) -> Self {
        self.word_bits = Some(value);
        self
    }

    pub fn endianness(mut self, value: Endianness) -> Self {
        self.endianness = Some(value);
        self
    }

    pub fn array_model(mut self, value: ArrayModel) -> Self {
        self.array_model = Some(value);
        self
    }

    pub fn annotation_assume(mut self, value: impl Into<String>) -> Self {
        self.annotation_assume = Some(value.into());
        self
    }

    pub fn annotation_simulate(mut self, value: impl Into<String>) -> Self {
        self.annotation_simulate = Some(value.into());
        self
    }

    pub fn build(self) -> AnalyzerConfig {
        let mut config = AnalyzerConfig::default();
        if let Some(v) = self.word_bits {
            config.word_bits = v;
        }
        if let Some(v) = self.endianness {
            config.endianness = v;
        }
        if let Some(v) = self.array_model {
            config.array_model = v;
        }
        if let Some(v) = self.annotation_assume {
            config.annotation_assume = v;
        }
        if let Some(v) = self.annotation_simulate {
            config.annotation_simulate = v;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AnalyzerConfig::default();
        assert_eq!(c.word_bits, 32);
        assert_eq!(c.endianness, Endianness::Little);
        assert_eq!(c.array_model, ArrayModel::Nested);
        assert_eq!(c.ident_temp_index, "__gtINDEX");
    }

    #[test]
    fn builder_overrides() {
        let c = AnalyzerConfig::builder()
            .word_bits(64)
            .endianness(Endianness::Big)
            .array_model(ArrayModel::Flat)
            .build();
        assert_eq!(c.word_bits, 64);
        assert_eq!(c.endianness, Endianness::Big);
        assert_eq!(c.array_model, ArrayModel::Flat);
        assert_eq!(c.ident_constraint, "gtCONSTRAINT");
    }
}
