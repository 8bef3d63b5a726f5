//! Configuration/scope evaluation engine.
//!
//! Groups form a tree (global -> shared-network -> subnet -> host), stored
//! as a flat arena of indexed handles rather than a graph of `Rc`/`RefCell`
//! nodes: statements only ever walk toward the root, so a `Vec<Group>` plus
//! `GroupId` parent pointers gives the same traversal with none of the
//! aliasing headaches a cyclic-capable graph would need. Not present in the
//! upstream server this crate started from; modeled on ISC `dhcpd`'s
//! `struct group`/`struct binding_scope` and `common/tree.h`'s tagged
//! expression union, re-expressed as a typed Rust enum instead of a
//! tag+union C struct.

use std::collections::HashMap;

use compact_str::CompactString;

pub type GroupId = usize;
pub type ClassId = usize;

/// A DHCP option code within some universe. The universe itself (`dhcp`,
/// `agent`, `vendor`, ...) is resolved by the caller; most statements only
/// ever touch the `dhcp` universe so we don't thread a universe tag through
/// every expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionCode(pub u16);

#[derive(Debug, Clone)]
pub struct OptionValue {
    pub code: OptionCode,
    pub data: Vec<u8>,
}

/// Source of facts an expression can read: the inbound packet's options,
/// the client's hardware address, an already-assigned lease address, and
/// whether the client is "known" (matched some reservation/host entry).
pub trait OptionSource {
    fn get_option(&self, code: OptionCode) -> Option<&[u8]>;
    fn raw(&self, offset: usize, len: usize) -> Option<&[u8]>;
}

pub struct EvalContext<'a> {
    pub options: &'a dyn OptionSource,
    pub hardware: Option<&'a [u8]>,
    pub leased_address: Option<&'a [u8]>,
    pub known: bool,
    pub classes_matched: &'a [ClassId],
    /// Resolves a named option-space encapsulation to its serialized TLV
    /// bytes (`codec::universe` territory); `None` if the engine wasn't
    /// wired to a codec layer (most tests don't need it).
    pub encapsulate: Option<&'a dyn Fn(&str) -> Option<Vec<u8>>>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Equal(Box<Expr>, Box<Expr>),
    Substring {
        data: Box<Expr>,
        offset: Box<Expr>,
        len: Box<Expr>,
    },
    Suffix {
        data: Box<Expr>,
        len: Box<Expr>,
    },
    Concat(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Option(OptionCode),
    Exists(OptionCode),
    Hardware,
    PacketRaw {
        offset: usize,
        len: usize,
    },
    ConstData(Vec<u8>),
    ConstInt(u32),
    ExtractInt8(Box<Expr>),
    ExtractInt16(Box<Expr>),
    ExtractInt32(Box<Expr>),
    EncodeInt8(Box<Expr>),
    EncodeInt16(Box<Expr>),
    EncodeInt32(Box<Expr>),
    HostLookup(CompactString),
    BinaryToAscii(Box<Expr>),
    Reverse(Box<Expr>),
    LeasedAddress,
    Check(ClassId),
    Encapsulate(CompactString),
    Match(ClassId),
    Known,
}

/// `ok=false` in the original tree-walker maps to `None` here: a type
/// mismatch or missing fact makes the whole expression unevaluable rather
/// than defaulting to some sentinel value.
pub fn eval_data(ctx: &EvalContext, expr: &Expr) -> Option<Vec<u8>> {
    match expr {
        Expr::ConstData(d) => Some(d.clone()),
        Expr::Concat(a, b) => {
            let mut lhs = eval_data(ctx, a)?;
            lhs.extend(eval_data(ctx, b)?);
            Some(lhs)
        }
        Expr::Substring { data, offset, len } => {
            let d = eval_data(ctx, data)?;
            let off = eval_numeric(ctx, offset)? as usize;
            let take = eval_numeric(ctx, len)? as usize;
            if off >= d.len() {
                return Some(Vec::new());
            }
            let end = off.saturating_add(take).min(d.len());
            Some(d[off..end].to_vec())
        }
        Expr::Suffix { data, len } => {
            let d = eval_data(ctx, data)?;
            let take = (eval_numeric(ctx, len)? as usize).min(d.len());
            Some(d[d.len() - take..].to_vec())
        }
        Expr::Option(code) => ctx.options.get_option(*code).map(|s| s.to_vec()),
        Expr::Hardware => ctx.hardware.map(|h| h.to_vec()),
        Expr::PacketRaw { offset, len } => ctx.options.raw(*offset, *len).map(|s| s.to_vec()),
        Expr::EncodeInt8(e) => eval_numeric(ctx, e).map(|n| vec![n as u8]),
        Expr::EncodeInt16(e) => eval_numeric(ctx, e).map(|n| (n as u16).to_be_bytes().to_vec()),
        Expr::EncodeInt32(e) => eval_numeric(ctx, e).map(|n| n.to_be_bytes().to_vec()),
        // DNS resolution is out of scope for the core engine (ambient DDNS
        // client is a non-goal); host-lookup always misses.
        Expr::HostLookup(_name) => None,
        Expr::BinaryToAscii(e) => eval_data(ctx, e).map(|d| {
            d.iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(":")
                .into_bytes()
        }),
        Expr::Reverse(e) => eval_data(ctx, e).map(|mut d| {
            d.reverse();
            d
        }),
        Expr::LeasedAddress => ctx.leased_address.map(|a| a.to_vec()),
        Expr::Encapsulate(name) => ctx.encapsulate.and_then(|f| f(name)),
        _ => None,
    }
}

pub fn eval_numeric(ctx: &EvalContext, expr: &Expr) -> Option<u32> {
    match expr {
        Expr::ConstInt(n) => Some(*n),
        Expr::ExtractInt8(e) => eval_data(ctx, e)?.first().copied().map(u32::from),
        Expr::ExtractInt16(e) => {
            let d = eval_data(ctx, e)?;
            (d.len() >= 2).then(|| u32::from(u16::from_be_bytes([d[0], d[1]])))
        }
        Expr::ExtractInt32(e) => {
            let d = eval_data(ctx, e)?;
            (d.len() >= 4).then(|| u32::from_be_bytes([d[0], d[1], d[2], d[3]]))
        }
        _ => None,
    }
}

/// `And`/`Or` are strict: both operands are always evaluated (not
/// short-circuited) so misconfigured right-hand expressions still surface
/// during evaluation rather than being silently skipped.
pub fn eval_boolean(ctx: &EvalContext, expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Equal(a, b) => Some(eval_data(ctx, a)? == eval_data(ctx, b)?),
        Expr::And(a, b) => {
            let lhs = eval_boolean(ctx, a);
            let rhs = eval_boolean(ctx, b);
            Some(lhs? && rhs?)
        }
        Expr::Or(a, b) => {
            let lhs = eval_boolean(ctx, a);
            let rhs = eval_boolean(ctx, b);
            Some(lhs? || rhs?)
        }
        Expr::Not(a) => eval_boolean(ctx, a).map(|b| !b),
        Expr::Exists(code) => Some(ctx.options.get_option(*code).is_some()),
        Expr::Known => Some(ctx.known),
        Expr::Check(cid) => Some(ctx.classes_matched.contains(cid)),
        Expr::Match(cid) => Some(ctx.classes_matched.contains(cid)),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub enum Statement {
    If {
        cond: Expr,
        then: Vec<Statement>,
        elifs: Vec<(Expr, Vec<Statement>)>,
        els: Vec<Statement>,
    },
    Eval(Expr),
    Supersede(OptionValue),
    Default(OptionValue),
    Append(OptionValue),
    Prepend(OptionValue),
    AddClass(ClassId),
    Set { name: CompactString, value: Expr },
}

#[derive(Debug, Clone, Default)]
pub struct Group {
    pub statements: Vec<Statement>,
    pub parent: Option<GroupId>,
}

/// Flat arena of groups, indexed by `GroupId`. Replaces the upstream
/// server's `group.next`/`group.parent` linked structure.
#[derive(Debug, Default)]
pub struct Arena {
    groups: Vec<Group>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group: Group) -> GroupId {
        self.groups.push(group);
        self.groups.len() - 1
    }

    pub fn get(&self, id: GroupId) -> &Group {
        &self.groups[id]
    }
}

/// Accumulated option overlay built up by walking a group chain. Not the
/// final option set itself (that's `codec`'s job) — just the
/// supersede/default/append/prepend results plus any classes a statement
/// spawned, for the caller to fold into the reply.
#[derive(Debug, Default)]
pub struct OptionOverlay {
    values: HashMap<OptionCode, Vec<u8>>,
    classes_added: Vec<ClassId>,
    vars: HashMap<CompactString, Vec<u8>>,
}

impl OptionOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supersede(&mut self, code: OptionCode, data: Vec<u8>) {
        self.values.insert(code, data);
    }

    pub fn default_value(&mut self, code: OptionCode, data: Vec<u8>) {
        self.values.entry(code).or_insert(data);
    }

    pub fn append(&mut self, code: OptionCode, data: &[u8]) {
        self.values.entry(code).or_default().extend_from_slice(data);
    }

    pub fn prepend(&mut self, code: OptionCode, data: &[u8]) {
        let entry = self.values.entry(code).or_default();
        let mut merged = data.to_vec();
        merged.extend_from_slice(entry);
        *entry = merged;
    }

    pub fn add_class(&mut self, cid: ClassId) {
        self.classes_added.push(cid);
    }

    pub fn set_var(&mut self, name: CompactString, data: Vec<u8>) {
        self.vars.insert(name, data);
    }

    pub fn get(&self, code: OptionCode) -> Option<&[u8]> {
        self.values.get(&code).map(|v| v.as_slice())
    }

    pub fn classes_added(&self) -> &[ClassId] {
        &self.classes_added
    }

    pub fn var(&self, name: &str) -> Option<&[u8]> {
        self.vars.get(name).map(|v| v.as_slice())
    }
}

fn execute_statements(ctx: &EvalContext, overlay: &mut OptionOverlay, statements: &[Statement]) {
    for stmt in statements {
        match stmt {
            Statement::If {
                cond,
                then,
                elifs,
                els,
            } => {
                if eval_boolean(ctx, cond) == Some(true) {
                    execute_statements(ctx, overlay, then);
                    continue;
                }
                let mut matched = false;
                for (c, body) in elifs {
                    if eval_boolean(ctx, c) == Some(true) {
                        execute_statements(ctx, overlay, body);
                        matched = true;
                        break;
                    }
                }
                if !matched {
                    execute_statements(ctx, overlay, els);
                }
            }
            // `eval` exists purely for its evaluation side effect
            // (diagnostics, or expressions with no data result); it never
            // mutates the overlay itself.
            Statement::Eval(expr) => {
                let _ = eval_boolean(ctx, expr);
            }
            Statement::Supersede(ov) => overlay.supersede(ov.code, ov.data.clone()),
            Statement::Default(ov) => overlay.default_value(ov.code, ov.data.clone()),
            Statement::Append(ov) => overlay.append(ov.code, &ov.data),
            Statement::Prepend(ov) => overlay.prepend(ov.code, &ov.data),
            Statement::AddClass(cid) => overlay.add_class(*cid),
            Statement::Set { name, value } => {
                if let Some(data) = eval_data(ctx, value) {
                    overlay.set_var(name.clone(), data);
                }
            }
        }
    }
}

/// Walks the group chain from `group` up to (and including) `limiting_group`
/// if given, executing each group's statements outer-first (root toward
/// `group`) so host-level statements run last and win ties via
/// supersede/default precedence.
///
/// `limiting_group` is compared by identity against *every* ancestor
/// visited while climbing, not just the immediate parent — see DESIGN.md
/// Open Question OQ-1. Without this, a `limiting_group` two or more levels
/// above `group` would never actually stop the walk.
pub fn execute_statements_in_scope(
    ctx: &EvalContext,
    arena: &Arena,
    group: GroupId,
    limiting_group: Option<GroupId>,
) -> OptionOverlay {
    let mut chain = Vec::new();
    let mut cursor = Some(group);
    while let Some(gid) = cursor {
        chain.push(gid);
        if Some(gid) == limiting_group {
            break;
        }
        cursor = arena.get(gid).parent;
    }
    chain.reverse();

    let mut overlay = OptionOverlay::new();
    for gid in chain {
        execute_statements(ctx, &mut overlay, &arena.get(gid).statements);
    }
    overlay
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullOptions;
    impl OptionSource for NullOptions {
        fn get_option(&self, _code: OptionCode) -> Option<&[u8]> {
            None
        }
        fn raw(&self, _offset: usize, _len: usize) -> Option<&[u8]> {
            None
        }
    }

    fn ctx() -> EvalContext<'static> {
        EvalContext {
            options: &NullOptions,
            hardware: None,
            leased_address: None,
            known: false,
            classes_matched: &[],
            encapsulate: None,
        }
    }

    #[test]
    fn equal_and_not_compose() {
        let c = ctx();
        let lhs = Expr::ConstData(vec![1, 2, 3]);
        let rhs = Expr::ConstData(vec![1, 2, 3]);
        assert_eq!(eval_boolean(&c, &Expr::Equal(Box::new(lhs), Box::new(rhs))), Some(true));

        let neq = Expr::Equal(
            Box::new(Expr::ConstData(vec![1])),
            Box::new(Expr::ConstData(vec![2])),
        );
        assert_eq!(eval_boolean(&c, &Expr::Not(Box::new(neq))), Some(true));
    }

    #[test]
    fn and_or_are_strict_none_propagates() {
        let c = ctx();
        let unknown = Expr::Exists(OptionCode(999)).clone();
        // Known(false) AND Exists(missing) -> both ok, combines fine.
        let and_expr = Expr::And(Box::new(Expr::Known), Box::new(unknown));
        assert_eq!(eval_boolean(&c, &and_expr), Some(false));

        // Substring with a non-data-typed operand "fails" to evaluate.
        let bad = Expr::Substring {
            data: Box::new(Expr::HostLookup("x".into())),
            offset: Box::new(Expr::ConstInt(0)),
            len: Box::new(Expr::ConstInt(1)),
        };
        assert_eq!(eval_data(&c, &bad), None);
    }

    #[test]
    fn substring_clamps_past_end() {
        let c = ctx();
        let data = Expr::ConstData(vec![1, 2, 3, 4]);
        let sub = Expr::Substring {
            data: Box::new(data.clone()),
            offset: Box::new(Expr::ConstInt(2)),
            len: Box::new(Expr::ConstInt(10)),
        };
        assert_eq!(eval_data(&c, &sub), Some(vec![3, 4]));

        let past_end = Expr::Substring {
            data: Box::new(data),
            offset: Box::new(Expr::ConstInt(10)),
            len: Box::new(Expr::ConstInt(1)),
        };
        assert_eq!(eval_data(&c, &past_end), Some(Vec::new()));
    }

    #[test]
    fn suffix_clamps_to_data_len() {
        let c = ctx();
        let suf = Expr::Suffix {
            data: Box::new(Expr::ConstData(vec![1, 2, 3])),
            len: Box::new(Expr::ConstInt(100)),
        };
        assert_eq!(eval_data(&c, &suf), Some(vec![1, 2, 3]));
    }

    #[test]
    fn supersede_wins_over_default_outer_first() {
        let c = ctx();
        let mut arena = Arena::new();
        let root = arena.insert(Group {
            statements: vec![Statement::Default(OptionValue {
                code: OptionCode(1),
                data: vec![0xAA],
            })],
            parent: None,
        });
        let host = arena.insert(Group {
            statements: vec![Statement::Supersede(OptionValue {
                code: OptionCode(1),
                data: vec![0xBB],
            })],
            parent: Some(root),
        });

        let overlay = execute_statements_in_scope(&c, &arena, host, None);
        assert_eq!(overlay.get(OptionCode(1)), Some([0xBB].as_slice()));
    }

    #[test]
    fn default_does_not_override_existing_value() {
        let c = ctx();
        let mut arena = Arena::new();
        let root = arena.insert(Group {
            statements: vec![Statement::Supersede(OptionValue {
                code: OptionCode(1),
                data: vec![0xAA],
            })],
            parent: None,
        });
        let host = arena.insert(Group {
            statements: vec![Statement::Default(OptionValue {
                code: OptionCode(1),
                data: vec![0xBB],
            })],
            parent: Some(root),
        });

        let overlay = execute_statements_in_scope(&c, &arena, host, None);
        assert_eq!(overlay.get(OptionCode(1)), Some([0xAA].as_slice()));
    }

    #[test]
    fn limiting_group_stops_walk_at_any_ancestor_depth() {
        let c = ctx();
        let mut arena = Arena::new();
        let global = arena.insert(Group {
            statements: vec![Statement::Supersede(OptionValue {
                code: OptionCode(1),
                data: vec![0x01],
            })],
            parent: None,
        });
        let shared_network = arena.insert(Group {
            statements: vec![Statement::Supersede(OptionValue {
                code: OptionCode(2),
                data: vec![0x02],
            })],
            parent: Some(global),
        });
        let subnet = arena.insert(Group {
            statements: vec![Statement::Supersede(OptionValue {
                code: OptionCode(3),
                data: vec![0x03],
            })],
            parent: Some(shared_network),
        });

        // limiting_group two levels up from `subnet`: only subnet's own
        // statements plus shared_network's should run, not global's.
        let overlay = execute_statements_in_scope(&c, &arena, subnet, Some(shared_network));
        assert_eq!(overlay.get(OptionCode(3)), Some([0x03].as_slice()));
        assert_eq!(overlay.get(OptionCode(2)), Some([0x02].as_slice()));
        assert_eq!(overlay.get(OptionCode(1)), None);
    }

    #[test]
    fn append_and_prepend_concatenate() {
        let c = ctx();
        let mut arena = Arena::new();
        let root = arena.insert(Group {
            statements: vec![
                Statement::Supersede(OptionValue {
                    code: OptionCode(1),
                    data: vec![2],
                }),
                Statement::Append(OptionValue {
                    code: OptionCode(1),
                    data: vec![3],
                }),
                Statement::Prepend(OptionValue {
                    code: OptionCode(1),
                    data: vec![1],
                }),
            ],
            parent: None,
        });
        let overlay = execute_statements_in_scope(&c, &arena, root, None);
        assert_eq!(overlay.get(OptionCode(1)), Some([1, 2, 3].as_slice()));
    }
}
