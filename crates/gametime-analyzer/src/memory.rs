//! Pointer, array and aggregate machinery
//!
//! A pointer is modeled as a Church-encoded dereferencing function: one
//! arity-2 `Function` layer per index level, whose application with
//! `(index, extra-bit-offset)` materializes the referenced element.
//! Offsetting a pointer rewrites the formals inside the function body: the
//! bit offset splits into an index delta (`offset / referent_bits`) and a
//! residual offset (`offset mod referent_bits`), both added to the existing
//! formals and simplified away when constant.
//!
//! Aggregates are modeled as one array per field, indexed by the containing
//! aggregate expression; an access that spans several fields is reassembled
//! from per-field `BitExtract` slices with an endianness-ordered `Concat`.

use crate::error::{AnalyzerError, AnalyzerWarning, Result};
use crate::path::Path;
use gametime_expr::{simplify, Expr, Op};
use gametime_ir::{AggregateType, CType, OperandId};
use tracing::{debug, warn};

/// One resolved field of an aggregate access: the declaring aggregate type,
/// the synthesized access expression, and the bit range it covers.
#[derive(Debug, Clone)]
pub struct AggregateField {
    pub aggregate: String,
    pub access: Expr,
    pub bit_offset: u64,
    pub bits: u32,
}

impl<'u> Path<'u> {
    // ---- dereferencing functions ----

    /// The dereferencing function for a pointer-shaped expression.
    ///
    /// Consults the alias table first when asked to; an expression that is
    /// already a function literal is its own dereferencing function.
    /// Panics when handed an expression with no pointer or array type —
    /// dereferencing a non-pointer is a programmer error.
    pub(crate) fn pointer_function_for(&mut self, base: &Expr, lookup_alias: bool) -> Expr {
        if lookup_alias {
            if let Some(mapped) = self.alias_table.get(base) {
                let mapped = mapped.clone();
                return if mapped.op() == Op::Function {
                    mapped
                } else {
                    self.pointer_function_for(&mapped, false)
                };
            }
        }
        if base.op() == Op::Function {
            return base.clone();
        }
        let ty = match base.ty() {
            Some(t) if t.is_pointer() || t.is_unmanaged_array() => t.clone(),
            _ => panic!("dereference of non-pointer expression {base}"),
        };
        self.deref_layers(base.clone(), &ty, None)
    }

    /// Wrap `base` in one function layer per index level of `ty`. A carried
    /// offset from the enclosing level is folded into this level's index and
    /// residual offset.
    fn deref_layers(&mut self, base: Expr, ty: &CType, carry: Option<Expr>) -> Expr {
        let elem = ty
            .element()
            .expect("deref_layers requires a pointer or array type")
            .clone();
        let elem_bits = self.carrier_bits(&elem);
        let word = self.config.word_bits;
        let i = self.fresh_temp_var(word);
        let o = self.fresh_temp_var(word);
        let (index, off) = match carry {
            Some(c) => {
                let eb = Expr::constant(elem_bits as i128, word);
                (
                    simplify(&Expr::add(i.clone(), Expr::sdiv(c.clone(), eb.clone()))),
                    simplify(&Expr::add(o.clone(), Expr::rem(c, eb))),
                )
            }
            None => (i.clone(), o.clone()),
        };
        let access = Expr::array_access(base, index, elem_bits).with_type(elem.clone());
        let body = if elem.is_pointer() || elem.is_unmanaged_array() {
            self.deref_layers(access, &elem, Some(off))
        } else {
            Expr::offset(access, off, elem_bits)
        };
        Expr::function(vec![i, o], body)
    }

    /// Width an element contributes as an array level: aggregates collapse
    /// to word-wide index carriers.
    pub(crate) fn carrier_bits(&self, ty: &CType) -> u32 {
        if ty.is_aggregate() {
            self.config.word_bits
        } else {
            ty.bit_size().max(1)
        }
    }

    /// Push a bit offset into a dereferencing function by rewriting its
    /// formals: the index advances by `delta / referent_bits` and the
    /// residual offset by `delta mod referent_bits`.
    pub(crate) fn add_offset_to_pointer(
        &self,
        f: &Expr,
        delta: &Expr,
        referent_bits: u32,
    ) -> Expr {
        assert_eq!(
            f.op(),
            Op::Function,
            "pointer offset on a non-function expression"
        );
        let i = f.get_parameter(0).clone();
        let o = f.get_parameter(1).clone();
        let body = f.get_parameter(2).clone();
        let rb = Expr::constant(referent_bits.max(1) as i128, delta.bits());
        let index_delta = simplify(&Expr::sdiv(delta.clone(), rb.clone()));
        let residual = simplify(&Expr::rem(delta.clone(), rb));
        let body = body.replace(&i, &Expr::add(i.clone(), index_delta));
        let body = body.replace(&o, &Expr::add(o.clone(), residual));
        Expr::function(vec![i, o], simplify(&body))
    }

    /// Apply a dereferencing function at `(0, 0)` and resolve the result.
    pub(crate) fn dereference(
        &mut self,
        f: &Expr,
        resolve_fields: bool,
        access_bits: u32,
    ) -> Result<Expr> {
        let zero = Expr::constant(0, self.config.word_bits);
        let applied = simplify(&f.apply(&[zero.clone(), zero]));
        self.resolve_offsets(&applied, resolve_fields, access_bits)
    }

    /// Walk a dereferenced reference, resolving `Offset` nodes:
    /// aggregate bases decompose into field accesses (or stand as-is when
    /// the aggregate is aliased rather than field-accessed), zero offsets
    /// vanish, and non-zero residual offsets — an aliasing cast — are
    /// preserved. The alias table has the last word.
    pub(crate) fn resolve_offsets(
        &mut self,
        e: &Expr,
        resolve_fields: bool,
        access_bits: u32,
    ) -> Result<Expr> {
        if e.op() != Op::Offset {
            return Ok(self.alias_resolved(e.clone()));
        }
        let base = self.resolve_offsets(e.get_parameter(0), resolve_fields, access_bits)?;
        let off = e.get_parameter(1).clone();
        if base.ty().is_some_and(|t| t.is_aggregate()) {
            if resolve_fields {
                let off_const = off.const_value().ok_or_else(|| {
                    AnalyzerError::Unsupported(format!(
                        "non-constant offset {off} in aggregate access"
                    ))
                })?;
                let resolved =
                    self.resolve_aggregate_access(&base, off_const as u64, access_bits)?;
                return Ok(self.alias_resolved(resolved));
            }
            return Ok(base);
        }
        if off.is_const(0) {
            return Ok(self.alias_resolved(base));
        }
        Ok(Expr::offset(base, off, access_bits))
    }

    fn alias_resolved(&self, e: Expr) -> Expr {
        match self.alias_table.get(&e) {
            Some(mapped) => mapped.clone(),
            None => e,
        }
    }

    // ---- aggregate field resolution ----

    /// Resolve an access of `access_bits` at `bit_offset` within an
    /// aggregate expression into per-field array accesses, reassembled with
    /// an endianness-aware concatenation when the range spans fields.
    pub(crate) fn resolve_aggregate_access(
        &mut self,
        aggregate: &Expr,
        bit_offset: u64,
        access_bits: u32,
    ) -> Result<Expr> {
        let (base, extra) = self.base_and_offset(aggregate);
        let extra = extra.const_value().ok_or_else(|| {
            AnalyzerError::Unsupported("non-constant aggregate base offset".to_string())
        })?;
        let offset = bit_offset + extra as u64;
        let decl = base
            .ty()
            .and_then(|t| t.as_aggregate())
            .cloned()
            .ok_or_else(|| {
                AnalyzerError::Unsupported(format!(
                    "aggregate access through non-aggregate base {base}"
                ))
            })?;
        let fields = self.aggregate_fields(&decl, &base, offset, access_bits)?;
        if fields.is_empty() {
            return Err(AnalyzerError::Unsupported(format!(
                "access at offset {offset} lies outside aggregate {}",
                decl.name
            )));
        }
        // A single exactly-matching field resolves directly; a contained
        // range extracts from it.
        if fields.len() == 1 {
            let f = &fields[0];
            if f.bit_offset == offset && f.bits == access_bits {
                return Ok(f.access.clone());
            }
            if f.bit_offset <= offset && offset + access_bits as u64 <= f.bit_offset + f.bits as u64
            {
                let lo = (offset - f.bit_offset) as u32;
                return Ok(Expr::bit_extract(f.access.clone(), lo, lo + access_bits - 1));
            }
        }
        self.concat_field_slices(&decl.name, &fields, offset, access_bits)
    }

    /// Enumerate the fields of `decl` that overlap the accessed bit range,
    /// recursing into nested aggregates and splitting fixed-size array
    /// fields into per-element synthetic fields.
    pub(crate) fn aggregate_fields(
        &mut self,
        decl: &std::sync::Arc<AggregateType>,
        carrier: &Expr,
        offset: u64,
        access_bits: u32,
    ) -> Result<Vec<AggregateField>> {
        let mut out = Vec::new();
        self.collect_fields(decl, decl, carrier, 0, offset, access_bits, &mut out)?;
        out.sort_by_key(|f| f.bit_offset);
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_fields(
        &mut self,
        base_decl: &std::sync::Arc<AggregateType>,
        decl: &std::sync::Arc<AggregateType>,
        carrier: &Expr,
        decl_offset: u64,
        offset: u64,
        access_bits: u32,
        out: &mut Vec<AggregateField>,
    ) -> Result<()> {
        let range_lo = offset;
        let range_hi = offset + access_bits as u64 - 1;
        for field in &decl.fields {
            let f_lo = decl_offset + field.bit_offset;
            let f_bits = field.ty.bit_size().max(1) as u64;
            let f_hi = f_lo + f_bits - 1;
            if f_hi < range_lo || f_lo > range_hi {
                continue;
            }
            match &field.ty {
                CType::Aggregate(inner) => {
                    // Offsets compose through nesting.
                    self.collect_fields(
                        base_decl, inner, carrier, f_lo, offset, access_bits, out,
                    )?;
                }
                CType::Array {
                    element,
                    length: Some(n),
                } => {
                    let e_bits = element.bit_size().max(1) as u64;
                    for k in 0..*n {
                        let e_lo = f_lo + k * e_bits;
                        let e_hi = e_lo + e_bits - 1;
                        if e_hi < range_lo || e_lo > range_hi {
                            continue;
                        }
                        let name = format!("{}_{}", field.name, k);
                        out.push(self.field_access(
                            base_decl,
                            &name,
                            element,
                            carrier,
                            e_lo,
                        ));
                    }
                }
                _ => {
                    out.push(self.field_access(
                        base_decl,
                        &field.name,
                        &field.ty,
                        carrier,
                        f_lo,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Synthesize the per-field array access `fieldarray[carrier]`. The
    /// array variable is named `<field-prefix><field><aggregate-prefix><type>`
    /// so that aliased aggregates reaching the same base share storage.
    fn field_access(
        &mut self,
        base_decl: &std::sync::Arc<AggregateType>,
        field_name: &str,
        field_ty: &CType,
        carrier: &Expr,
        bit_offset: u64,
    ) -> AggregateField {
        let bits = field_ty.bit_size().max(1);
        let name = format!(
            "{}{}{}{}",
            self.config.ident_field, field_name, self.config.ident_aggregate, base_decl.name
        );
        let word = self.config.word_bits;
        let leaf = Expr::array_variable(&name, bits);
        self.register_leaf(&leaf);
        self.array_dimensions
            .entry(name.clone())
            .or_insert_with(|| vec![word, bits]);
        self.array_lengths.entry(name).or_insert_with(|| vec![None]);
        let access = Expr::array_access(leaf, carrier.clone(), bits).with_type(field_ty.clone());
        AggregateField {
            aggregate: base_decl.name.clone(),
            access,
            bit_offset,
            bits,
        }
    }

    /// Reassemble an access that spans several fields: extract the
    /// overlapping slice of every field, order by endianness, and zero-pad
    /// the high bits when coverage is incomplete.
    fn concat_field_slices(
        &mut self,
        aggregate: &str,
        fields: &[AggregateField],
        offset: u64,
        access_bits: u32,
    ) -> Result<Expr> {
        use crate::config::Endianness;
        let range_hi = offset + access_bits as u64 - 1;
        let mut slices: Vec<Expr> = Vec::new();
        let mut covered: u32 = 0;
        for f in fields {
            let f_hi = f.bit_offset + f.bits as u64 - 1;
            let lo_in_field = offset.saturating_sub(f.bit_offset) as u32;
            let hi_in_field = (range_hi.min(f_hi) - f.bit_offset) as u32;
            let slice = if lo_in_field == 0 && hi_in_field == f.bits - 1 {
                f.access.clone()
            } else {
                Expr::bit_extract(f.access.clone(), lo_in_field, hi_in_field)
            };
            covered += hi_in_field - lo_in_field + 1;
            slices.push(slice);
        }
        // Fields arrive sorted by ascending offset. Low offsets are least
        // significant on a little-endian target, most significant on a
        // big-endian one.
        let mut iter = slices.into_iter();
        let first = iter.next().expect("at least one overlapping field");
        let mut acc = first;
        for s in iter {
            acc = match self.config.endianness {
                Endianness::Little => Expr::concat(s, acc),
                Endianness::Big => Expr::concat(acc, s),
            };
        }
        if covered < access_bits {
            let missing = access_bits - covered;
            warn!(
                aggregate,
                offset, access_bits, "aggregate access does not match field boundaries"
            );
            self.warnings.push(AnalyzerWarning::PartialFieldCoverage {
                aggregate: aggregate.to_string(),
                bit_offset: offset,
                access_bits,
            });
            acc = Expr::concat(Expr::constant(0, missing), acc);
        }
        Ok(acc)
    }

    // ---- address-taken promotion ----

    /// `&x`: the first time a variable's address is taken, synthesize a
    /// temporary pointer `p`, record the equality `*p = x` as a condition,
    /// and map `x → p`. Every subsequent `&x` reuses the same pointer, so
    /// the address-of operator never reaches the emitted query.
    pub(crate) fn trace_address_of(&mut self, op_id: OperandId) -> Result<Expr> {
        let unit = self.unit;
        let data = unit.operand(op_id);
        let ptr_ty = data.ty.clone();
        assert!(
            ptr_ty.is_pointer(),
            "temporary pointer construction with non-pointer type {ptr_ty:?}"
        );
        let referent = ptr_ty.referent().expect("pointer has a referent").clone();
        let word = self.config.word_bits;
        let name = crate::executor::demangle(data.name().unwrap_or_default()).to_string();
        let bits = self.carrier_bits(&referent);
        let x_leaf = if referent.is_pointer() || referent.is_unmanaged_array() {
            Expr::array_variable(name, bits)
        } else {
            Expr::variable(name, bits)
        }
        .with_type(referent);
        self.register_leaf(&x_leaf);
        if let Some(p) = self.address_taken.get(&x_leaf) {
            let p = p.clone();
            return Ok(self.pointer_function_for(&p, false));
        }
        let p_name = self.fresh_temp_ptr_name();
        debug!(variable = %x_leaf, pointer = %p_name, "address-taken promotion");
        let p_leaf = Expr::array_variable(p_name, word).with_type(ptr_ty);
        self.register_leaf(&p_leaf);
        let deref = Expr::array_access(p_leaf.clone(), Expr::constant(0, word), x_leaf.bits());
        let rhs = self.update_expression(&x_leaf, self.cur_block);
        let cond = Expr::eq(deref.clone(), rhs, word);
        self.push_condition(cond, self.cur_block, self.cur_line, None);
        self.address_taken.insert(x_leaf.clone(), p_leaf.clone());
        self.alias_table.insert(deref, x_leaf);
        Ok(self.pointer_function_for(&p_leaf, false))
    }
}

/// Split a (possibly pointer-shaped) sum into its pointer base and its
/// offset part.
pub(crate) fn get_augend_and_addend(e: &Expr) -> (Expr, Expr) {
    let a = e.get_parameter(0);
    let b = e.get_parameter(1);
    let a_is_pointer = a.op() == Op::Function
        || a.op() == Op::ArrayVariable
        || a.ty()
            .is_some_and(|t| t.is_pointer() || t.is_unmanaged_array());
    if a_is_pointer {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}
