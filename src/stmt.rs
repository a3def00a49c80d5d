//! Module `stmt` implement the statement model, the unit of exchange
//! between runs, the merge source and the write iterator.

use arbitrary::{Arbitrary, Unstructured};
use cbordata::{Cbor, Cborize, FromCbor, IntoCbor};

use crate::Result;

/// This value must change only when the shape of Statement type changes.
/// High 16-bits identify the type and lower 16-bits identify the version.
pub const STMT_VER: u32 = 0x00010001;
/// Version for the Op type, part of its cbor serialization.
pub const OP_VER: u32 = 0x00020001;

/// Bit-flag for statements whose overwrite of an older primary-index row
/// has not yet been tombstoned in the secondary indexes. Refer to
/// [DeferredHandler][crate::DeferredHandler] for how the debt is settled.
pub const DEFERRED_DELETE: u32 = 0x1;

/// Trait for differential upsert payloads.
///
/// An UPSERT statement does not carry an absolute value, it carries a
/// delta that lands on whatever older value exist for the key. If,
///
/// ```notest
/// B = value beneath the upsert, possibly absent; D = the upsert delta
/// ```
///
/// then `D.land(B)` is the value a reader observes at the upsert's LSN.
/// Two deltas can be folded into one with `squash`, such that landing the
/// folded delta equals landing both in sequence.
pub trait Upsert: Sized {
    /// Land this delta on the older value beneath it. `None` means the
    /// key is absent or deleted at that point in history.
    fn land(&self, older: Option<&Self>) -> Self;

    /// Fold a strictly newer delta into this older delta. For any base
    /// `b`, `self.squash(newer).land(b)` equals `newer.land(self.land(b))`.
    fn squash(&self, newer: &Self) -> Self;
}

macro_rules! impl_upsert_basic_types {
    ($($type:ident,)*) => (
        $(
            // create-if-absent flavor, an existing value wins over the delta.
            impl Upsert for $type {
                fn land(&self, older: Option<&$type>) -> $type {
                    match older {
                        Some(value) => *value,
                        None => *self,
                    }
                }

                fn squash(&self, _newer: &$type) -> $type {
                    *self
                }
            }
        )*
    );
}

impl_upsert_basic_types![
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize,
];

/// Single mutation operation on a key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Op<V> {
    /// Create the key, asserting that no older run holds a row for it.
    Insert { value: V },
    /// Set the key's value, whether or not an older row exists.
    Replace { value: V },
    /// Tombstone the key.
    Delete,
    /// Differential update, merges with strictly older statements only.
    Upsert { delta: V },
}

impl<V> Op<V> {
    pub const ID: u32 = OP_VER;
}

// Hand-written in place of `#[derive(Cborize)]`: cbordata-derive 0.6.0 emits
// a match arm without a trailing comma for unit variants, which fails to
// parse for any enum containing one (e.g. `Op::Delete`). This mirrors the
// wire format the macro generates for struct types (see `Statement` below).
impl<V> IntoCbor for Op<V>
where
    V: IntoCbor,
{
    fn into_cbor(self) -> cbordata::Result<Cbor> {
        let mut items: Vec<Cbor> = Vec::default();

        let id: Cbor = {
            let id = Op::<V>::ID.into_cbor()?;
            cbordata::Tag::from_identifier(id).into()
        };
        items.push(id);

        match self {
            Op::Insert { value } => {
                items.push("Insert".into_cbor()?);
                items.push(value.into_cbor()?);
            }
            Op::Replace { value } => {
                items.push("Replace".into_cbor()?);
                items.push(value.into_cbor()?);
            }
            Op::Delete => {
                items.push("Delete".into_cbor()?);
            }
            Op::Upsert { delta } => {
                items.push("Upsert".into_cbor()?);
                items.push(delta.into_cbor()?);
            }
        }

        items.into_cbor()
    }
}

impl<V> FromCbor for Op<V>
where
    V: FromCbor,
{
    fn from_cbor(value: Cbor) -> cbordata::Result<Op<V>> {
        use cbordata::Error;

        let mut items = Vec::<Cbor>::from_cbor(value)?;

        if items.is_empty() {
            cbordata::err_at!(FailConvert, msg: "empty msg for Op")?;
        }
        let data_id = items.remove(0);
        let type_id: Cbor = {
            let id = Op::<V>::ID.into_cbor()?;
            cbordata::Tag::from_identifier(id).into()
        };
        if data_id != type_id {
            cbordata::err_at!(FailConvert, msg: "bad id for Op")?;
        }

        let variant_name = String::from_cbor(items.remove(0))?;

        match variant_name.as_str() {
            "Insert" | "Replace" | "Upsert" if items.len() != 1 => {
                cbordata::err_at!(FailConvert, msg: "bad arity {} {}", 1, items.len())?;
            }
            "Delete" if !items.is_empty() => {
                cbordata::err_at!(FailConvert, msg: "bad arity {}", items.len())?;
            }
            "Insert" | "Replace" | "Upsert" | "Delete" => (),
            _ => {
                cbordata::err_at!(FailConvert, msg: "invalid variant_name {}", variant_name)?;
            }
        }

        let val = match variant_name.as_str() {
            "Insert" => Op::Insert {
                value: FromCbor::from_cbor(items.remove(0))?,
            },
            "Replace" => Op::Replace {
                value: FromCbor::from_cbor(items.remove(0))?,
            },
            "Delete" => Op::Delete,
            "Upsert" => Op::Upsert {
                delta: FromCbor::from_cbor(items.remove(0))?,
            },
            _ => cbordata::err_at!(FailConvert, msg: "invalid variant_name {}", variant_name)?,
        };
        Ok(val)
    }
}

/// Statement is a single versioned mutation of a key.
///
/// Statements are immutable values ordered by `(key ASC, lsn DESC)`;
/// the LSN is strictly positive and unique across the inputs of one
/// compaction. The only flag material to the write iterator is
/// [DEFERRED_DELETE].
#[derive(Clone, Debug, Eq, PartialEq, Cborize)]
pub struct Statement<K, V> {
    key: K,
    lsn: u64,
    flags: u32,
    op: Op<V>,
}

impl<K, V> Statement<K, V> {
    pub const ID: u32 = STMT_VER;

    pub fn new_insert(key: K, value: V, lsn: u64) -> Statement<K, V> {
        Statement {
            key,
            lsn,
            flags: 0,
            op: Op::Insert { value },
        }
    }

    pub fn new_replace(key: K, value: V, lsn: u64) -> Statement<K, V> {
        Statement {
            key,
            lsn,
            flags: 0,
            op: Op::Replace { value },
        }
    }

    pub fn new_delete(key: K, lsn: u64) -> Statement<K, V> {
        Statement {
            key,
            lsn,
            flags: 0,
            op: Op::Delete,
        }
    }

    pub fn new_upsert(key: K, delta: V, lsn: u64) -> Statement<K, V> {
        Statement {
            key,
            lsn,
            flags: 0,
            op: Op::Upsert { delta },
        }
    }

    /// Mark this statement as owing a deferred tombstone to the secondary
    /// indexes. Meaningful only on REPLACE and DELETE statements.
    pub fn set_deferred_delete(mut self) -> Statement<K, V> {
        self.flags |= DEFERRED_DELETE;
        self
    }

    pub fn clear_deferred_delete(&mut self) -> &mut Self {
        self.flags &= !DEFERRED_DELETE;
        self
    }

    pub fn set_lsn(&mut self, lsn: u64) -> &mut Self {
        self.lsn = lsn;
        self
    }
}

impl<K, V> Statement<K, V> {
    #[inline]
    pub fn as_key(&self) -> &K {
        &self.key
    }

    #[inline]
    pub fn to_key(&self) -> K
    where
        K: Clone,
    {
        self.key.clone()
    }

    #[inline]
    pub fn to_lsn(&self) -> u64 {
        self.lsn
    }

    #[inline]
    pub fn to_flags(&self) -> u32 {
        self.flags
    }

    #[inline]
    pub fn as_op(&self) -> &Op<V> {
        &self.op
    }

    #[inline]
    pub fn is_deferred_delete(&self) -> bool {
        (self.flags & DEFERRED_DELETE) != 0
    }

    #[inline]
    pub fn is_insert(&self) -> bool {
        matches!(self.op, Op::Insert { .. })
    }

    #[inline]
    pub fn is_replace(&self) -> bool {
        matches!(self.op, Op::Replace { .. })
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        matches!(self.op, Op::Delete)
    }

    #[inline]
    pub fn is_upsert(&self) -> bool {
        matches!(self.op, Op::Upsert { .. })
    }

    /// Return whether this statement resolves the key's value absolutely.
    /// INSERT, REPLACE and DELETE are terminal, UPSERT is not.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !self.is_upsert()
    }

    /// Return the absolute value carried by this statement, None for
    /// DELETE and UPSERT.
    pub fn to_value(&self) -> Option<V>
    where
        V: Clone,
    {
        match &self.op {
            Op::Insert { value } => Some(value.clone()),
            Op::Replace { value } => Some(value.clone()),
            Op::Delete | Op::Upsert { .. } => None,
        }
    }

    /// Return the upsert delta, None for terminal statements.
    pub fn as_delta(&self) -> Option<&V> {
        match &self.op {
            Op::Upsert { delta } => Some(delta),
            _ => None,
        }
    }

    /// Synthesize a surrogate DELETE carrying the key columns of this
    /// statement, stamped with the overwriting statement's `lsn`.
    pub fn to_surrogate_delete(&self, lsn: u64) -> Statement<K, V>
    where
        K: Clone,
    {
        Statement::new_delete(self.key.clone(), lsn)
    }

    /// Copy of this statement re-typed as REPLACE, keeping key, value,
    /// LSN and flags. Valid on INSERT and REPLACE.
    pub fn to_replace(&self) -> Result<Statement<K, V>>
    where
        K: Clone,
        V: Clone,
    {
        match &self.op {
            Op::Insert { value } | Op::Replace { value } => Ok(Statement {
                key: self.key.clone(),
                lsn: self.lsn,
                flags: self.flags,
                op: Op::Replace {
                    value: value.clone(),
                },
            }),
            _ => err_at!(Invariant, msg: "re-type {} to replace", self.lsn),
        }
    }

    /// Copy of this statement re-typed as INSERT, keeping key, value,
    /// LSN and flags. Valid on INSERT and REPLACE.
    pub fn to_insert(&self) -> Result<Statement<K, V>>
    where
        K: Clone,
        V: Clone,
    {
        match &self.op {
            Op::Insert { value } | Op::Replace { value } => Ok(Statement {
                key: self.key.clone(),
                lsn: self.lsn,
                flags: self.flags,
                op: Op::Insert {
                    value: value.clone(),
                },
            }),
            _ => err_at!(Invariant, msg: "re-type {} to insert", self.lsn),
        }
    }

    /// Encode this statement into the cbor byte-string persisted in a run.
    pub fn into_bytes(self) -> Result<Vec<u8>>
    where
        K: IntoCbor,
        V: IntoCbor,
    {
        let lsn = self.lsn;
        let mut data: Vec<u8> = vec![];
        let n = err_at!(FailCbor, err_at!(FailCbor, self.into_cbor())?.encode(&mut data))?;
        if n != data.len() {
            return err_at!(FailCbor, msg: "short encode {}/{} for stmt {}", n, data.len(), lsn);
        }
        Ok(data)
    }

    /// Decode a statement from its on-run byte-string. Return the
    /// statement and the number of bytes consumed.
    pub fn from_bytes(mut data: &[u8]) -> Result<(Statement<K, V>, usize)>
    where
        K: FromCbor,
        V: FromCbor,
    {
        let (val, n) = err_at!(FailCbor, Cbor::decode(&mut data))?;
        Ok((err_at!(FailCbor, Statement::from_cbor(val))?, n))
    }
}

impl<K, V> Statement<K, V>
where
    K: Clone,
    V: Clone + Upsert,
{
    /// Merge this UPSERT with the immediately older statement beneath it,
    /// producing the statement a reader at this LSN observes. An older
    /// upsert squashes into a single upsert, an older terminal (or no
    /// older statement at all) lands the delta into a REPLACE. The result
    /// keeps this statement's LSN.
    pub fn merge_upsert(&self, older: Option<&Statement<K, V>>) -> Result<Statement<K, V>> {
        let delta = match &self.op {
            Op::Upsert { delta } => delta,
            _ => return err_at!(Invariant, msg: "merge_upsert on terminal {}", self.lsn),
        };

        let stmt = match older.map(|o| &o.op) {
            Some(Op::Upsert { delta: od }) => {
                Statement::new_upsert(self.key.clone(), od.squash(delta), self.lsn)
            }
            Some(Op::Insert { value }) | Some(Op::Replace { value }) => {
                Statement::new_replace(self.key.clone(), delta.land(Some(value)), self.lsn)
            }
            Some(Op::Delete) | None => {
                Statement::new_replace(self.key.clone(), delta.land(None), self.lsn)
            }
        };

        Ok(stmt)
    }
}

impl<'a, K, V> Arbitrary<'a> for Statement<K, V>
where
    K: Arbitrary<'a>,
    V: Arbitrary<'a>,
{
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let key: K = u.arbitrary()?;
        let lsn = (u.arbitrary::<u64>()? % 1_000_000) + 1;

        let stmt = match u.arbitrary::<u8>()? % 4 {
            0 => Statement::new_insert(key, u.arbitrary()?, lsn),
            1 => Statement::new_replace(key, u.arbitrary()?, lsn),
            2 => Statement::new_delete(key, lsn),
            3 => Statement::new_upsert(key, u.arbitrary()?, lsn),
            _ => unreachable!(),
        };

        let deferred = (u.arbitrary::<u8>()? % 4) == 0;
        match stmt {
            stmt if deferred && (stmt.is_replace() || stmt.is_deleted()) => {
                Ok(stmt.set_deferred_delete())
            }
            stmt => Ok(stmt),
        }
    }
}

#[cfg(test)]
#[path = "stmt_test.rs"]
mod stmt_test;
