//! End-to-end walks over synthetic AMD64 stacks, one test per protocol
//! guarantee: complete outward traversal, adapter transparency, classifier
//! totality, innermost-handler precedence, the stack-fault reference-map
//! skip, and side-effect-free inspection.

use sable_core::{Address, Word};
use sable_stack::arch::amd64::Amd64Backend;
use sable_stack::arch::ArchBackend;
use sable_stack::{
    Cursor, ExceptionTypeId, FrameFlags, FrameState, MemoryStackAccess, RawFrameVisitor,
    ReferenceMapSink, StackUnwindingContext, StackWalker, TargetMethod, ThrownException, TrapKind, TrapState,
    UnwindEnvironment, UnwindOperation, UnwindTransfer, WalkConfig, WalkContext,
};
use std::cell::{Cell, RefCell};
use std::sync::Arc;

// =============================================================================
// Fixture
// =============================================================================

/// A compiled method whose layout facts come straight from the test.
struct FixtureMethod {
    code_start: Address,
    code_size: usize,
    frame_size: usize,
    optimized_entry: Address,
    adapter_frame_code_size: usize,
    adapter_frame_size: usize,
    non_parameter_locals: usize,
    handler: Option<(ExceptionTypeId, Address)>,
    catch_queries: Cell<usize>,
}

impl FixtureMethod {
    fn new(code_start: u64) -> Self {
        Self {
            code_start: Address::new(code_start),
            code_size: 0x200,
            frame_size: 0x40,
            optimized_entry: Address::new(code_start),
            adapter_frame_code_size: 0,
            adapter_frame_size: 0,
            non_parameter_locals: 16,
            handler: None,
            catch_queries: Cell::new(0),
        }
    }

    fn with_adapter(mut self, code_size: usize, frame_size: usize) -> Self {
        // Optimized entry and adapter code at the start of the method.
        self.optimized_entry = self.code_start;
        self.adapter_frame_code_size = code_size;
        self.adapter_frame_size = frame_size;
        self
    }

    fn with_handler(mut self, ty: ExceptionTypeId, catch: Address) -> Self {
        self.handler = Some((ty, catch));
        self
    }
}

impl TargetMethod for FixtureMethod {
    fn code_start(&self) -> Address {
        self.code_start
    }
    fn code_size(&self) -> usize {
        self.code_size
    }
    fn frame_size(&self) -> usize {
        self.frame_size
    }
    fn jit_entry_point(&self) -> Address {
        self.code_start.plus(self.adapter_frame_code_size)
    }
    fn optimized_entry_point(&self) -> Address {
        self.optimized_entry
    }
    fn adapter_frame_code_size(&self) -> usize {
        self.adapter_frame_code_size
    }
    fn adapter_frame_size(&self) -> usize {
        self.adapter_frame_size
    }
    fn frame_builder_size(&self) -> usize {
        0
    }
    fn size_of_non_parameter_locals(&self) -> usize {
        self.non_parameter_locals
    }
    fn size_of_template_slots(&self) -> usize {
        0
    }
    fn catch_address_for(
        &self,
        _is_top_frame: bool,
        _throw_ip: Address,
        exception_type: ExceptionTypeId,
    ) -> Option<Address> {
        self.catch_queries.set(self.catch_queries.get() + 1);
        self.handler
            .filter(|(ty, _)| *ty == exception_type)
            .map(|(_, catch)| catch)
    }
    fn prepare_frame_reference_map(
        &self,
        sink: &mut dyn ReferenceMapSink,
        _ip: Address,
        frame_base: Address,
        _operand_sp: Address,
        _extra_save_area_size: usize,
    ) -> bool {
        sink.record_reference_slot(frame_base);
        true
    }
}

struct CollectingVisitor {
    frames: Vec<(Address, Address, Address, u8)>,
}

impl RawFrameVisitor for CollectingVisitor {
    fn visit_raw_frame(
        &mut self,
        _method: &dyn TargetMethod,
        ip: Address,
        sp: Address,
        frame_base: Address,
        flags: FrameFlags,
    ) -> bool {
        self.frames.push((ip, sp, frame_base, flags.bits()));
        true
    }
}

struct CollectingSink {
    slots: Vec<Address>,
}

impl ReferenceMapSink for CollectingSink {
    fn record_reference_slot(&mut self, slot: Address) {
        self.slots.push(slot);
    }
}

struct NullEnv;

impl UnwindEnvironment for NullEnv {
    fn set_pending_exception(&mut self, _object: Word) {}
    fn enable_safepoints(&mut self) {}
    fn reprotect_stack_guard(&mut self) {}
}

struct RecordingTransfer {
    op: RefCell<Option<UnwindOperation>>,
}

impl UnwindTransfer for RecordingTransfer {
    unsafe fn transfer(&self, op: &UnwindOperation) {
        *self.op.borrow_mut() = Some(op.clone());
    }
}

/// Builds a chain of `methods.len()` frames in the Normal state, innermost
/// first, with the root sentinel above the outermost. Returns the walk's
/// starting (ip, sp, fp); frame i executes at `code_start + 0x80`.
fn build_chain(
    access: &mut MemoryStackAccess,
    methods: &[Arc<FixtureMethod>],
) -> (Address, Address, Address) {
    let mut fps = Vec::new();
    for (i, method) in methods.iter().enumerate() {
        access.register_method(method.clone());
        fps.push(Address::new(0x8000 + 0x100 * i as u64));
    }
    for i in 0..methods.len() {
        let return_ip = if i + 1 < methods.len() {
            methods[i + 1].code_start().plus(0x80).to_word()
        } else {
            Word::ZERO
        };
        let caller_fp = if i + 1 < methods.len() {
            fps[i + 1].to_word()
        } else {
            Word::new(0x9999)
        };
        access.set_word(fps[i], caller_fp);
        access.set_word(fps[i].plus_word(), return_ip);
    }
    (
        methods[0].code_start().plus(0x80),
        fps[0].minus(0x40),
        fps[0],
    )
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn walk_traverses_every_frame_outward() {
    let mut access = MemoryStackAccess::new();
    let methods: Vec<_> = (0..5)
        .map(|i| Arc::new(FixtureMethod::new(0x1000 + 0x1000 * i)))
        .collect();
    let (ip, sp, fp) = build_chain(&mut access, &methods);

    let backend = Amd64Backend::new(WalkConfig::amd64());
    let mut walker = StackWalker::new(&backend);
    walker.begin(&access, ip, sp, fp).unwrap();

    let mut visitor = CollectingVisitor { frames: Vec::new() };
    walker.walk(&mut access, &mut WalkContext::RawInspecting(&mut visitor));

    assert_eq!(visitor.frames.len(), 5);
    let ips: Vec<_> = visitor.frames.iter().map(|f| f.0).collect();
    let expected: Vec<_> = methods.iter().map(|m| m.code_start().plus(0x80)).collect();
    assert_eq!(ips, expected, "innermost first, every frame once");
    // Only the first frame carries the top-frame flag.
    assert_eq!(visitor.frames[0].3, FrameFlags::TOP_FRAME.bits());
    assert!(visitor.frames[1..].iter().all(|f| f.3 == 0));
    assert!(!walker.is_in_progress());
}

#[test]
fn adapter_frames_are_reported_to_inspection_but_invisible_to_refmaps() {
    // Top frame stopped at the optimized entry of a method with an adapter:
    // the caller's return address is still at the stack pointer.
    let adapter_method = Arc::new(FixtureMethod::new(0x1000).with_adapter(0x18, 24));
    let caller_method = Arc::new(FixtureMethod::new(0x2000));

    let mut access = MemoryStackAccess::new();
    access.register_method(adapter_method.clone());
    access.register_method(caller_method.clone());

    // Caller frame's return-address slot reads zero, ending the walk at it.
    let sp = Address::new(0x8000);
    access.set_word(sp, Address::new(0x2080).to_word());

    let backend = Amd64Backend::new(WalkConfig::amd64());
    let start = (Address::new(0x1000), sp, Address::new(0x9000));

    // Inspection sees the adapter frame, flagged.
    let mut walker = StackWalker::new(&backend);
    walker.begin(&access, start.0, start.1, start.2).unwrap();
    let mut visitor = CollectingVisitor { frames: Vec::new() };
    walker.walk(&mut access, &mut WalkContext::RawInspecting(&mut visitor));

    assert_eq!(visitor.frames.len(), 2);
    assert_eq!(
        visitor.frames[0].3,
        (FrameFlags::TOP_FRAME | FrameFlags::ADAPTER_FRAME).bits()
    );
    assert_eq!(visitor.frames[1].0, Address::new(0x2080));

    // The reference-map walk passes through silently and reaches the same
    // caller; only the caller contributes slots.
    let caller_frame_base = visitor.frames[1].2;
    let mut walker = StackWalker::new(&backend);
    walker.begin(&access, start.0, start.1, start.2).unwrap();
    let mut sink = CollectingSink { slots: Vec::new() };
    walker.walk(&mut access, &mut WalkContext::ReferenceMapPreparing(&mut sink));

    assert_eq!(sink.slots, vec![caller_frame_base]);
}

#[test]
fn adapter_caller_recovery_matches_from_top_and_non_top_approach() {
    // Three frames: a plain callee whose return address lands inside the
    // adapter code of the middle method, then the adapter's caller.
    let callee = Arc::new(FixtureMethod::new(0x1000));
    let adapter = Arc::new(FixtureMethod::new(0x2000).with_adapter(0x18, 24));
    let outer = Arc::new(FixtureMethod::new(0x3000));

    let mut access = MemoryStackAccess::new();
    access.register_method(callee.clone());
    access.register_method(adapter.clone());
    access.register_method(outer.clone());

    let callee_fp = Address::new(0x8000);
    access.set_word(callee_fp, Address::new(0x9000).to_word());
    access.set_word(callee_fp.plus_word(), Address::new(0x2008).to_word());
    // Adapter frame built (ip past the optimized entry): the caller's
    // return address sits one adapter frame above the adapter's sp.
    let adapter_sp = callee_fp.plus(2 * 8);
    access.set_word(adapter_sp.plus(24), Address::new(0x3080).to_word());
    // Outer frame ends the walk at the root sentinel.
    let outer_fp = adapter_sp.plus(24).plus_word();
    access.set_word(outer_fp.plus_word(), Word::ZERO);

    let backend = Amd64Backend::new(WalkConfig::amd64());

    // Approach 1: the adapter is a middle frame of a longer walk.
    let mut walker = StackWalker::new(&backend);
    walker
        .begin(&access, Address::new(0x1080), Address::new(0x7fc0), callee_fp)
        .unwrap();
    let mut through = CollectingVisitor { frames: Vec::new() };
    walker.walk(&mut access, &mut WalkContext::RawInspecting(&mut through));

    // Approach 2: the walk starts inside the adapter, making it the top frame.
    let mut walker = StackWalker::new(&backend);
    walker
        .begin(&access, Address::new(0x2008), adapter_sp, Address::new(0x9000))
        .unwrap();
    let mut from_top = CollectingVisitor { frames: Vec::new() };
    walker.walk(&mut access, &mut WalkContext::RawInspecting(&mut from_top));

    assert_eq!(through.frames.len(), 3);
    assert_eq!(from_top.frames.len(), 2);

    // The adapter frame is flagged in both approaches, differing only in
    // the top-frame bit.
    assert_eq!(through.frames[1].3, FrameFlags::ADAPTER_FRAME.bits());
    assert_eq!(
        from_top.frames[0].3,
        (FrameFlags::TOP_FRAME | FrameFlags::ADAPTER_FRAME).bits()
    );
    assert_eq!(through.frames[1].0, Address::new(0x2008));

    // The caller recovered through the adapter is identical either way.
    assert_eq!(through.frames[2], from_top.frames[1]);
    assert_eq!(through.frames[2].0, Address::new(0x3080));
}

#[test]
fn classifier_is_total_and_deterministic() {
    let method = Arc::new(FixtureMethod::new(0x1000));
    let access = MemoryStackAccess::new();
    let backend = Amd64Backend::new(WalkConfig::amd64());

    for offset in 0..0x200u64 {
        let ip = Address::new(0x1000 + offset);
        let cursor = Cursor::top(ip, Address::new(0x8000), Address::new(0x9000), method.clone());
        let first = backend.classify(&access, &cursor);
        let second = backend.classify(&access, &cursor);
        assert!(
            FrameState::ALL.contains(&first),
            "every address maps into the closed state set, got {first:?} at {ip}"
        );
        assert_eq!(first, second, "same inputs, same state at {ip}");
    }
}

#[test]
fn innermost_handler_wins_and_outer_frames_are_never_asked() {
    let ty = ExceptionTypeId(7);
    let inner_catch = Address::new(0x2100);
    let outer_catch = Address::new(0x3100);

    let throwing = Arc::new(FixtureMethod::new(0x1000));
    let inner = Arc::new(FixtureMethod::new(0x2000).with_handler(ty, inner_catch));
    let outer = Arc::new(FixtureMethod::new(0x3000).with_handler(ty, outer_catch));
    let methods = vec![throwing.clone(), inner.clone(), outer.clone()];

    let mut access = MemoryStackAccess::new();
    let (ip, sp, fp) = build_chain(&mut access, &methods);

    let backend = Amd64Backend::new(WalkConfig::amd64());
    let mut walker = StackWalker::new(&backend);
    walker.begin(&access, ip, sp, fp).unwrap();

    let mut context = StackUnwindingContext::new(
        ThrownException {
            object: Word::new(0xeeee),
            type_id: ty,
            stack_overflow: false,
        },
        None,
    );
    let mut env = NullEnv;
    let transfer = RecordingTransfer {
        op: RefCell::new(None),
    };
    walker.walk(
        &mut access,
        &mut WalkContext::ExceptionHandling {
            context: &mut context,
            env: &mut env,
            transfer: &transfer,
        },
    );

    let op = transfer.op.borrow();
    let op = op.as_ref().unwrap();
    assert_eq!(op.catch_address, inner_catch, "innermost handler wins");
    assert_eq!(throwing.catch_queries.get(), 1);
    assert_eq!(inner.catch_queries.get(), 1);
    assert_eq!(outer.catch_queries.get(), 0, "walk stopped at the handler");
    assert!(!walker.is_in_progress());
}

#[test]
fn stack_fault_skips_only_the_faulted_frame() {
    let methods = vec![
        Arc::new(FixtureMethod::new(0x1000)),
        Arc::new(FixtureMethod::new(0x2000)),
    ];

    let mut access = MemoryStackAccess::new();
    let (ip, sp, fp) = build_chain(&mut access, &methods);
    // The guard-page fault interrupted the innermost frame.
    access.set_trap_state(Some(TrapState::new(
        TrapKind::StackFault,
        Address::new(0x2080),
    )));

    let backend = Amd64Backend::new(WalkConfig::amd64());
    let mut walker = StackWalker::new(&backend);
    walker.begin(&access, ip, sp, fp).unwrap();

    let mut sink = CollectingSink { slots: Vec::new() };
    walker.walk(&mut access, &mut WalkContext::ReferenceMapPreparing(&mut sink));

    // The faulted frame contributes nothing and raises no error; the trap
    // dies with it, so the untrapped outer frame still reports its root.
    assert_eq!(sink.slots, vec![Address::new(0x8100)]);
    assert!(!walker.is_in_progress());
}

#[test]
fn inspection_walks_are_idempotent() {
    let mut access = MemoryStackAccess::new();
    let methods: Vec<_> = (0..4)
        .map(|i| Arc::new(FixtureMethod::new(0x1000 + 0x1000 * i)))
        .collect();
    let (ip, sp, fp) = build_chain(&mut access, &methods);

    let backend = Amd64Backend::new(WalkConfig::amd64());
    let mut first = CollectingVisitor { frames: Vec::new() };
    let mut second = CollectingVisitor { frames: Vec::new() };

    for visitor in [&mut first, &mut second] {
        let mut walker = StackWalker::new(&backend);
        walker.begin(&access, ip, sp, fp).unwrap();
        walker.walk(&mut access, &mut WalkContext::RawInspecting(visitor));
    }

    assert_eq!(first.frames, second.frames, "walks mutate nothing");
}
