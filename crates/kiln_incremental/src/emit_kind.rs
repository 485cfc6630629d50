//! Which outputs of a file are still owed.
//!
//! [`EmitKind`] is a small bit set over the six independent kinds of output
//! a file can produce. The pending-emit map stores one per file; the delta
//! between two kinds decides how little can be redone after an option change.

use bitflags::bitflags;
use kiln_config::CompilerOptions;

bitflags! {
    /// Outputs a file produces or still needs to produce.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EmitKind: u32 {
        /// The `.js` file.
        const JS = 1 << 0;
        /// The `.js.map` file.
        const JS_MAP = 1 << 1;
        /// A source map embedded in the `.js` file.
        const JS_INLINE_MAP = 1 << 2;
        /// Declaration diagnostics.
        const DTS_ERRORS = 1 << 3;
        /// The `.d.ts` file.
        const DTS_EMIT = 1 << 4;
        /// The `.d.ts.map` file.
        const DTS_MAP = 1 << 5;

        /// Declaration checking plus declaration output.
        const DTS = Self::DTS_ERRORS.bits() | Self::DTS_EMIT.bits();
        /// Every JavaScript output.
        const ALL_JS = Self::JS.bits() | Self::JS_MAP.bits() | Self::JS_INLINE_MAP.bits();
        /// Every declaration file output.
        const ALL_DTS_EMIT = Self::DTS_EMIT.bits() | Self::DTS_MAP.bits();
        /// Every declaration output and declaration diagnostics.
        const ALL_DTS = Self::DTS.bits() | Self::DTS_MAP.bits();
        /// Everything.
        const ALL = Self::ALL_JS.bits() | Self::ALL_DTS.bits();
    }
}

/// Returns the outputs `options` ask every emittable file to produce.
pub fn get_file_emit_kind(options: &CompilerOptions) -> EmitKind {
    let mut result = EmitKind::JS;
    if options.source_map.is_true() {
        result |= EmitKind::JS_MAP;
    }
    if options.inline_source_map.is_true() {
        result |= EmitKind::JS_INLINE_MAP;
    }
    if options.emit_declarations() {
        result |= EmitKind::DTS;
    }
    if options.declaration_map.is_true() {
        result |= EmitKind::DTS_MAP;
    }
    if options.emit_declaration_only.is_true() {
        result &= EmitKind::ALL_DTS;
    }
    result
}

/// Computes what is still owed when a file needs `new` and `old` is what it
/// last had (or what was just produced).
///
/// Equal kinds owe nothing. If either side is empty the other is owed in
/// full. Otherwise each group is compared on its own: a difference in the
/// JavaScript group owes the new JavaScript bits, a difference in declaration
/// diagnostics owes the new diagnostics bit, and a difference in declaration
/// output owes the new declaration output bits.
pub fn pending_emit_kind(new: EmitKind, old: EmitKind) -> EmitKind {
    if old == new {
        return EmitKind::empty();
    }
    if old.is_empty() || new.is_empty() {
        return new | old;
    }
    let diff = old ^ new;
    let mut result = EmitKind::empty();
    if diff.intersects(EmitKind::ALL_JS) {
        result |= new & EmitKind::ALL_JS;
    }
    if diff.intersects(EmitKind::DTS_ERRORS) {
        result |= new & EmitKind::DTS_ERRORS;
    }
    if diff.intersects(EmitKind::ALL_DTS_EMIT) {
        result |= new & EmitKind::ALL_DTS_EMIT;
    }
    result
}

/// [`pending_emit_kind`] between the targets of two option sets.
pub fn pending_emit_kind_for_options(new: &CompilerOptions, old: &CompilerOptions) -> EmitKind {
    pending_emit_kind(get_file_emit_kind(new), get_file_emit_kind(old))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::Tristate;

    fn options(edit: impl FnOnce(&mut CompilerOptions)) -> CompilerOptions {
        let mut options = CompilerOptions::default();
        edit(&mut options);
        options
    }

    #[test]
    fn default_options_emit_js_only() {
        assert_eq!(get_file_emit_kind(&CompilerOptions::default()), EmitKind::JS);
    }

    #[test]
    fn composite_with_maps() {
        let opts = options(|o| {
            o.composite = Tristate::True;
            o.declaration_map = Tristate::True;
            o.source_map = Tristate::True;
        });
        assert_eq!(
            get_file_emit_kind(&opts),
            EmitKind::JS | EmitKind::JS_MAP | EmitKind::ALL_DTS
        );
    }

    #[test]
    fn declaration_only_drops_js() {
        let opts = options(|o| {
            o.declaration = Tristate::True;
            o.emit_declaration_only = Tristate::True;
            o.source_map = Tristate::True;
        });
        assert_eq!(get_file_emit_kind(&opts), EmitKind::DTS);
    }

    #[test]
    fn enabling_options_only_adds_bits() {
        let steps: [fn(&mut CompilerOptions); 4] = [
            |o| o.source_map = Tristate::True,
            |o| o.inline_source_map = Tristate::True,
            |o| o.declaration = Tristate::True,
            |o| o.declaration_map = Tristate::True,
        ];
        let mut current = CompilerOptions::default();
        let mut previous = get_file_emit_kind(&current);
        for step in steps {
            step(&mut current);
            let next = get_file_emit_kind(&current);
            assert!(next.contains(previous), "{next:?} should contain {previous:?}");
            previous = next;
        }
    }

    #[test]
    fn same_options_owe_nothing() {
        let opts = options(|o| {
            o.declaration = Tristate::True;
            o.source_map = Tristate::True;
        });
        assert_eq!(pending_emit_kind_for_options(&opts, &opts), EmitKind::empty());
    }

    #[test]
    fn empty_side_owes_the_other() {
        for kind in [EmitKind::JS, EmitKind::DTS, EmitKind::ALL, EmitKind::JS_MAP] {
            assert_eq!(pending_emit_kind(kind, EmitKind::empty()), kind);
            assert_eq!(pending_emit_kind(EmitKind::empty(), kind), kind);
        }
    }

    #[test]
    fn source_map_toggle_owes_only_js() {
        let old = options(|o| o.declaration = Tristate::True);
        let new = options(|o| {
            o.declaration = Tristate::True;
            o.source_map = Tristate::True;
        });
        assert_eq!(
            pending_emit_kind_for_options(&new, &old),
            EmitKind::JS | EmitKind::JS_MAP
        );
    }

    #[test]
    fn declaration_map_toggle_owes_declaration_output_only() {
        let old = options(|o| o.composite = Tristate::True);
        let new = options(|o| {
            o.composite = Tristate::True;
            o.declaration_map = Tristate::True;
        });
        assert_eq!(
            pending_emit_kind_for_options(&new, &old),
            EmitKind::ALL_DTS_EMIT
        );
    }

    #[test]
    fn turning_declarations_on_owes_checking_and_output() {
        let old = CompilerOptions::default();
        let new = options(|o| o.declaration = Tristate::True);
        assert_eq!(pending_emit_kind_for_options(&new, &old), EmitKind::DTS);
    }

    #[test]
    fn turning_source_maps_off_rewrites_js() {
        let old = options(|o| o.source_map = Tristate::True);
        let new = CompilerOptions::default();
        assert_eq!(pending_emit_kind_for_options(&new, &old), EmitKind::JS);
    }
}
