//! Interrupts, string instructions, I/O, aliases and save states.

use std::cell::RefCell;
use std::rc::Rc;

use super::{cpu_model, cpu_with, set_vector, stack_word, CODE};
use crate::bus::{AddressSpace, Bus, FlatMemory, MemoryDevice};
use crate::config::{DeviceConfig, IsaConfig};
use crate::cpu_8086::registers::{AX, BX, CS, CX, DI, DS, DX, ES, SI, SP, SS};
use crate::cpu_8086::{Cpu8086, CpuModel, FLAG_DF, FLAG_IF, FLAG_TF, FLAG_ZF};
use crate::engine::{ExecutionUnit, HookAction, HookContext, RunState};
use crate::error::{ConfigError, StateError};
use crate::interrupt::{InputLine, LineState};

#[test]
fn test_software_interrupt() {
    // STI ; INT 21h
    let mut cpu = cpu_with(&[0xFB, 0xCD, 0x21]);
    set_vector(&mut cpu, 0x21, 0x0500, 0x0040);
    cpu.step();
    assert_eq!(cpu.step(), 51);
    assert_eq!((cpu.regs.sregs[CS], cpu.regs.ip), (0x0500, 0x0040));
    assert_eq!(stack_word(&mut cpu, 0), 3);
    assert_eq!(stack_word(&mut cpu, 1), 0x0100);
    assert_ne!(stack_word(&mut cpu, 2) & FLAG_IF, 0);
    assert!(!cpu.regs.flag(FLAG_IF));
}

#[test]
fn test_int3_and_into() {
    // INT3 ; INTO (OF clear)
    let mut cpu = cpu_with(&[0xCE, 0xCC]);
    set_vector(&mut cpu, 3, 0x0500, 0x0000);
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.step(), 52);
    assert_eq!(stack_word(&mut cpu, 0), 2);
}

#[test]
fn test_8088_interrupt_pays_for_word_transfers() {
    // Three pushes and two vector reads at 4 clocks each.
    let mut cpu = cpu_model(&[0xCD, 0x21], CpuModel::Intel8088);
    set_vector(&mut cpu, 0x21, 0x0500, 0x0000);
    assert_eq!(cpu.step(), 51 + 5 * 4);
}

#[test]
fn test_intr_uses_line_vector() {
    let mut cpu = cpu_with(&[0x90]);
    cpu.regs.set_flag(FLAG_IF, true);
    set_vector(&mut cpu, 0x20, 0x0500, 0x0000);
    cpu.set_line_vector(InputLine::Irq(0), 0x20);
    cpu.set_line(InputLine::Irq(0), LineState::Hold);
    assert_eq!(cpu.step(), 61);
    assert_eq!(cpu.regs.sregs[CS], 0x0500);
    // Taken before the NOP ran.
    assert_eq!(stack_word(&mut cpu, 0), 0);
    assert!(!cpu.regs.flag(FLAG_IF));
}

#[test]
fn test_default_intr_vector() {
    let mut cpu = cpu_with(&[0x90]);
    cpu.regs.set_flag(FLAG_IF, true);
    set_vector(&mut cpu, 0x08, 0x0700, 0x0010);
    cpu.set_line(InputLine::Irq(0), LineState::Pulse);
    cpu.step();
    assert_eq!((cpu.regs.sregs[CS], cpu.regs.ip), (0x0700, 0x0010));
}

#[test]
fn test_nmi_beats_intr_and_ignores_if() {
    let mut cpu = cpu_with(&[0x90, 0x90]);
    cpu.regs.set_flag(FLAG_IF, true);
    set_vector(&mut cpu, 2, 0x0600, 0x0000);
    set_vector(&mut cpu, 0x08, 0x0700, 0x0000);
    cpu.set_line(InputLine::Irq(0), LineState::Assert);
    cpu.set_line(InputLine::Nmi, LineState::Pulse);
    assert_eq!(cpu.step(), 50);
    assert_eq!(cpu.regs.sregs[CS], 0x0600);

    // IF is clear inside the handler, so INTR waits.
    let mut cpu = cpu_with(&[0x90]);
    set_vector(&mut cpu, 2, 0x0600, 0x0000);
    cpu.set_line(InputLine::Nmi, LineState::Pulse);
    assert_eq!(cpu.step(), 50);
}

#[test]
fn test_intr_masked_by_if() {
    let mut cpu = cpu_with(&[0x90, 0xFB, 0x90, 0x90]);
    cpu.set_line(InputLine::Irq(0), LineState::Assert);
    assert_eq!(cpu.step(), 3);
    assert_eq!(cpu.regs.ip, 1);
    // STI, then one more instruction before the interrupt.
    assert_eq!(cpu.step(), 2);
    assert_eq!(cpu.step(), 3);
    assert_eq!(cpu.step(), 61);
    assert_eq!(stack_word(&mut cpu, 0), 3);
}

#[test]
fn test_hlt_waits_for_interrupt() {
    let mut cpu = cpu_with(&[0xF4, 0x90]);
    cpu.regs.set_flag(FLAG_IF, true);
    set_vector(&mut cpu, 0x08, 0x0500, 0x0000);
    assert_eq!(cpu.step(), 2);
    assert_eq!(cpu.run_state(), RunState::Halted);
    // Spin: a halted core burns its whole budget.
    assert_eq!(cpu.run(100), 100);
    assert_eq!(cpu.regs.ip, 1);

    cpu.set_line(InputLine::Irq(0), LineState::Hold);
    assert_eq!(cpu.step(), 61);
    assert_eq!(cpu.run_state(), RunState::Running);
    assert_eq!(stack_word(&mut cpu, 0), 1);
}

#[test]
fn test_hlt_with_interrupts_disabled_stays_halted() {
    let mut cpu = cpu_with(&[0xF4]);
    cpu.set_line(InputLine::Irq(0), LineState::Assert);
    cpu.step();
    assert_eq!(cpu.run(50), 50);
    assert_eq!(cpu.run_state(), RunState::Halted);

    // NMI still gets through.
    set_vector(&mut cpu, 2, 0x0600, 0x0000);
    cpu.set_line(InputLine::Nmi, LineState::Pulse);
    assert_eq!(cpu.step(), 50);
    assert_eq!(cpu.run_state(), RunState::Running);
}

#[test]
fn test_mov_ss_holds_off_interrupts() {
    // MOV SS, AX ; NOP ; NOP
    let mut cpu = cpu_with(&[0x8E, 0xD0, 0x90, 0x90]);
    cpu.regs.w[AX] = 0x2000;
    cpu.regs.set_flag(FLAG_IF, true);
    assert_eq!(cpu.step(), 2);
    cpu.set_line(InputLine::Irq(0), LineState::Hold);
    assert_eq!(cpu.step(), 3);
    assert_eq!(cpu.step(), 61);
    assert_eq!(stack_word(&mut cpu, 0), 3);
}

#[test]
fn test_single_step_trap() {
    let mut cpu = cpu_with(&[0x90, 0x90]);
    set_vector(&mut cpu, 1, 0x0600, 0x0000);
    cpu.regs.set_flag(FLAG_TF, true);
    assert_eq!(cpu.step(), 3);
    assert_eq!(cpu.step(), 51);
    assert_eq!(cpu.regs.sregs[CS], 0x0600);
    assert_eq!(stack_word(&mut cpu, 0), 1);
    assert_ne!(stack_word(&mut cpu, 2) & FLAG_TF, 0);
    assert!(!cpu.regs.flag(FLAG_TF));
}

#[test]
fn test_break_inside_mov_ss_window() {
    // MOV SS, AX ; MOV SP, 0200h ; NOP
    let mut cpu = cpu_with(&[0x8E, 0xD0, 0xBC, 0x00, 0x02, 0x90]);
    cpu.regs.w[AX] = 0x2000;
    cpu.regs.set_flag(FLAG_IF, true);
    set_vector(&mut cpu, 0x20, 0x0500, 0x0000);
    cpu.set_line_vector(InputLine::Irq(0), 0x20);
    assert_eq!(cpu.step(), 2);

    cpu.set_line(InputLine::Irq(0), LineState::Hold);
    let mut fired = false;
    cpu.set_debug_hook(Some(Box::new(move |ctx: &HookContext<'_>| {
        if ctx.pc == CODE + 2 && !fired {
            fired = true;
            HookAction::Break
        } else {
            HookAction::Continue
        }
    })));
    assert_eq!(cpu.run(100), 0);
    assert_eq!(cpu.regs.ip, 2);

    // The SP load still completes before the interrupt frame is pushed.
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.regs.w[SP], 0x0200);
    assert_eq!(cpu.step(), 61);
    assert_eq!(cpu.regs.sregs[CS], 0x0500);
    assert_eq!(cpu.regs.w[SP], 0x01FA);
    assert_eq!(stack_word(&mut cpu, 0), 5);
}

#[test]
fn test_trap_survives_nmi_entry() {
    let mut cpu = cpu_with(&[0x90, 0x90]);
    set_vector(&mut cpu, 1, 0x0600, 0x0000);
    set_vector(&mut cpu, 2, 0x0700, 0x0000);
    cpu.regs.set_flag(FLAG_TF, true);
    assert_eq!(cpu.step(), 3);

    cpu.set_line(InputLine::Nmi, LineState::Pulse);
    assert_eq!(cpu.step(), 50);
    assert_eq!(cpu.regs.sregs[CS], 0x0700);

    // The trap belongs to the NOP but lands on the NMI handler's entry.
    assert_eq!(cpu.step(), 51);
    assert_eq!(cpu.regs.sregs[CS], 0x0600);
    assert_eq!(stack_word(&mut cpu, 0), 0x0000);
    assert_eq!(stack_word(&mut cpu, 1), 0x0700);
    assert_eq!(stack_word(&mut cpu, 2) & FLAG_TF, 0);
    assert_eq!(stack_word(&mut cpu, 3), 1);
    assert_eq!(stack_word(&mut cpu, 4), 0x0100);
    assert_ne!(stack_word(&mut cpu, 5) & FLAG_TF, 0);
}

#[test]
fn test_trap_not_taken_for_instruction_that_sets_tf() {
    // PUSHF ; POP AX ; OR AH, 1 ; PUSH AX ; POPF ; NOP
    let mut cpu = cpu_with(&[0x9C, 0x58, 0x80, 0xCC, 0x01, 0x50, 0x9D, 0x90]);
    set_vector(&mut cpu, 1, 0x0600, 0x0000);
    for _ in 0..5 {
        cpu.step();
    }
    assert!(cpu.regs.flag(FLAG_TF));
    assert_eq!(cpu.step(), 3);
    assert_eq!(cpu.step(), 51);
}

#[test]
fn test_rep_movsb_runs_one_element_per_boundary() {
    // REP MOVSB
    let mut cpu = cpu_with(&[0xF3, 0xA4]);
    cpu.bus.load(0x30000, &[1, 2, 3]);
    cpu.regs.w[CX] = 3;
    assert_eq!(cpu.step(), 9 + 17);
    assert_eq!(cpu.regs.ip, 0);
    assert_eq!(cpu.step(), 17);
    assert_eq!(cpu.step(), 17);
    assert_eq!(cpu.regs.ip, 2);
    assert_eq!(cpu.regs.w[CX], 0);
    assert_eq!((cpu.regs.w[SI], cpu.regs.w[DI]), (3, 3));
    assert_eq!(cpu.bus.data[0x40000..0x40003], [1u8, 2, 3]);
    assert_eq!(cpu.total_cycles(), 60);
}

#[test]
fn test_rep_with_zero_count() {
    let mut cpu = cpu_with(&[0xF3, 0xA4]);
    assert_eq!(cpu.step(), 9);
    assert_eq!(cpu.regs.ip, 2);
    assert_eq!(cpu.regs.w[SI], 0);
}

#[test]
fn test_repe_cmpsb_stops_on_mismatch() {
    let mut cpu = cpu_with(&[0xF3, 0xA6]);
    cpu.bus.load(0x30000, &[1, 2, 3]);
    cpu.bus.load(0x40000, &[1, 9, 3]);
    cpu.regs.w[CX] = 3;
    assert_eq!(cpu.step(), 9 + 22);
    assert_eq!(cpu.step(), 22);
    assert_eq!(cpu.regs.ip, 2);
    assert_eq!(cpu.regs.w[CX], 1);
    assert!(!cpu.regs.flag(FLAG_ZF));
}

#[test]
fn test_repne_scasb_finds_byte() {
    let mut cpu = cpu_with(&[0xF2, 0xAE]);
    cpu.bus.load(0x40000, &[1, 2, 3, 4]);
    cpu.regs.w[AX] = 3;
    cpu.regs.w[CX] = 10;
    assert_eq!(cpu.run(9 + 15 * 3), 9 + 15 * 3);
    assert_eq!(cpu.regs.ip, 2);
    assert_eq!((cpu.regs.w[CX], cpu.regs.w[DI]), (7, 3));
    assert!(cpu.regs.flag(FLAG_ZF));
}

#[test]
fn test_rep_stosb_and_lodsw_direction() {
    let mut cpu = cpu_with(&[0xF3, 0xAA]);
    cpu.regs.w[AX] = 0x00AB;
    cpu.regs.w[CX] = 2;
    assert_eq!(cpu.step(), 9 + 10);
    assert_eq!(cpu.step(), 10);
    assert_eq!(cpu.bus.data[0x40000..0x40002], [0xABu8, 0xAB]);

    // STD ; LODSW
    let mut cpu = cpu_with(&[0xFD, 0xAD]);
    cpu.regs.w[SI] = 0x0010;
    cpu.bus.write_word(0x30010, 0x1234);
    cpu.step();
    assert!(cpu.regs.flag(FLAG_DF));
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.regs.w[AX], 0x1234);
    assert_eq!(cpu.regs.w[SI], 0x000E);
}

#[test]
fn test_interrupted_rep_resumes_at_last_prefix() {
    // ES: REP MOVSB
    let mut cpu = cpu_with(&[0x26, 0xF3, 0xA4]);
    set_vector(&mut cpu, 0x08, 0x0500, 0x0000);
    cpu.bus.load(0x40000, &[7, 7, 7]);
    cpu.regs.w[CX] = 3;
    cpu.regs.w[DI] = 0x0100;
    cpu.regs.set_flag(FLAG_IF, true);
    assert_eq!(cpu.step(), 2 + 9 + 17);
    assert_eq!(cpu.regs.ip, 1);

    cpu.set_line(InputLine::Irq(0), LineState::Hold);
    assert_eq!(cpu.step(), 61);
    // The ES override byte is lost: the return address is the REP prefix.
    assert_eq!(stack_word(&mut cpu, 0), 1);
    assert_eq!(cpu.regs.w[CX], 2);
    assert_eq!(cpu.bus.read_byte(0x40100), 7);
}

#[test]
fn test_prefix_run_is_cut_short() {
    let mut code = vec![0x26; 16];
    code.push(0x90);
    let mut cpu = cpu_with(&code);
    assert_eq!(cpu.step(), 32);
    assert_eq!(cpu.regs.ip, 16);
}

#[test]
fn test_lock_prefix_costs_two() {
    let mut cpu = cpu_with(&[0xF0, 0x90]);
    assert_eq!(cpu.step(), 5);
}

#[test]
fn test_pop_cs_alias() {
    let mut cpu = cpu_with(&[0x0F]);
    cpu.bus.write_word(0x20100, 0x0200);
    assert_eq!(cpu.step(), 8);
    assert_eq!((cpu.regs.sregs[CS], cpu.regs.ip), (0x0200, 1));
    assert_eq!(cpu.regs.w[SP], 0x0102);
}

#[test]
fn test_segment_register_field_is_two_bits() {
    // MOV ES, AX encoded with reg=4 ; MOV AX, DS encoded with reg=7
    let mut cpu = cpu_with(&[0x8E, 0xE0, 0x8C, 0xF8]);
    cpu.regs.w[AX] = 0x1234;
    assert_eq!(cpu.step(), 2);
    assert_eq!(cpu.regs.sregs[ES], 0x1234);
    cpu.step();
    assert_eq!(cpu.regs.w[AX], 0x3000);
}

#[test]
fn test_push_aliases_and_push_sp() {
    // PUSH BX (FF /6) ; PUSH BX (FF /7) ; PUSH SP
    let mut cpu = cpu_with(&[0xFF, 0xF3, 0xFF, 0xFB, 0x54]);
    cpu.regs.w[BX] = 0xBEEF;
    assert_eq!(cpu.step(), 11);
    assert_eq!(cpu.step(), 11);
    assert_eq!(stack_word(&mut cpu, 0), 0xBEEF);
    assert_eq!(stack_word(&mut cpu, 1), 0xBEEF);
    cpu.step();
    assert_eq!(stack_word(&mut cpu, 0), 0x00FA);
}

#[test]
fn test_salc() {
    // STC ; SALC ; CLC ; SALC
    let mut cpu = cpu_with(&[0xF9, 0xD6, 0xF8, 0xD6]);
    cpu.step();
    assert_eq!(cpu.step(), 3);
    assert_eq!(cpu.regs.al(), 0xFF);
    cpu.step();
    cpu.step();
    assert_eq!(cpu.regs.al(), 0x00);
}

#[test]
fn test_xlat() {
    let mut cpu = cpu_with(&[0xD7]);
    cpu.regs.w[BX] = 0x0010;
    cpu.regs.w[AX] = 0x0002;
    cpu.bus.write_byte(0x30012, 0x77);
    assert_eq!(cpu.step(), 11);
    assert_eq!(cpu.regs.al(), 0x77);
}

#[test]
fn test_xchg() {
    // XCHG AX, DX ; XCHG [BX], CL
    let mut cpu = cpu_with(&[0x92, 0x86, 0x0F]);
    cpu.regs.w[AX] = 1;
    cpu.regs.w[DX] = 2;
    cpu.regs.w[CX] = 0x0055;
    cpu.bus.write_byte(0x30000, 0x66);
    assert_eq!(cpu.step(), 3);
    assert_eq!((cpu.regs.w[AX], cpu.regs.w[DX]), (2, 1));
    assert_eq!(cpu.step(), 17 + 5);
    assert_eq!(cpu.regs.w[CX], 0x0066);
    assert_eq!(cpu.bus.read_byte(0x30000), 0x55);
}

/// Port block that remembers writes and answers reads with `0x40 + offset`.
struct Latch(Rc<RefCell<Vec<(u32, u8)>>>);

impl MemoryDevice for Latch {
    fn read(&mut self, offset: u32) -> u8 {
        0x40 + offset as u8
    }

    fn write(&mut self, offset: u32, val: u8) {
        self.0.borrow_mut().push((offset, val));
    }
}

#[test]
fn test_port_io_through_address_space() {
    let writes = Rc::new(RefCell::new(Vec::new()));
    let mut space = AddressSpace::new(20);
    space.map_ram("ram", 0, 0x10_0000).unwrap();
    space
        .map_io("ppi", 0x60, 0x63, Box::new(Latch(writes.clone())))
        .unwrap();
    // MOV AL,55 ; OUT 60,AL ; IN AL,61 ; MOV DX,0062 ; OUT DX,AX ; IN AX,DX ; IN AL,80
    space.poke(
        CODE,
        &[
            0xB0, 0x55, 0xE6, 0x60, 0xE4, 0x61, 0xBA, 0x62, 0x00, 0xEF, 0xED, 0xE4, 0x80,
        ],
    );
    let mut cpu = Cpu8086::new(space);
    cpu.regs.sregs[CS] = 0x0100;
    cpu.regs.ip = 0;

    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.step(), 10);
    assert_eq!(cpu.step(), 10);
    assert_eq!(cpu.regs.al(), 0x41);
    cpu.step();
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.w[AX], 0x4342);
    assert_eq!(*writes.borrow(), vec![(0, 0x55), (2, 0x41), (3, 0x00)]);
    cpu.step();
    assert_eq!(cpu.regs.al(), 0xFF);
}

#[test]
fn test_odd_port_word_penalty() {
    // IN AX, 61h
    let mut cpu = cpu_with(&[0xE5, 0x61]);
    assert_eq!(cpu.step(), 10 + 4);
    assert_eq!(cpu.regs.w[AX], 0xFFFF);
}

#[test]
fn test_hook_sees_physical_pc() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let mut cpu = cpu_with(&[0x90, 0x90, 0x90]);
    cpu.set_debug_hook(Some(Box::new(move |ctx: &HookContext<'_>| {
        log.borrow_mut().push(ctx.pc);
        if ctx.pc == CODE + 2 {
            HookAction::Break
        } else {
            HookAction::Continue
        }
    })));
    assert_eq!(cpu.run(100), 6);
    assert_eq!(*seen.borrow(), vec![CODE, CODE + 1, CODE + 2]);
    // Resuming runs the instruction the hook stopped at.
    assert_eq!(cpu.run(3), 3);
    assert_eq!(cpu.regs.ip, 3);
}

#[test]
fn test_every_opcode_byte_executes() {
    for op in 0..=0xFFu8 {
        let mut cpu = cpu_with(&[op, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(cpu.step() > 0, "opcode {:02X}", op);
    }
}

/// CX = 0x50 ; LOOP $ ; HLT
fn loop_program() -> Cpu8086<FlatMemory> {
    cpu_with(&[0xB9, 0x50, 0x00, 0xE2, 0xFE, 0xF4])
}

#[test]
fn test_split_runs_match_single_run() {
    let mut whole = loop_program();
    let consumed = whole.run(1000);

    let mut split = loop_program();
    let mut used = 0;
    for chunk in [1, 7, 13, 40, 3].iter().cycle() {
        if used >= 1000 {
            break;
        }
        used += split.run((*chunk).min(1000 - used));
    }
    assert_eq!(used, consumed);
    assert_eq!(split.total_cycles(), whole.total_cycles());
    assert_eq!(split.regs, whole.regs);
}

#[test]
fn test_save_and_restore_mid_rep() {
    let code = [0xF3, 0xA4];
    let mut cpu = cpu_with(&code);
    cpu.bus.load(0x30000, &[1, 2, 3, 4]);
    cpu.regs.w[CX] = 4;
    cpu.step();
    let saved = cpu.save_state();

    let mut restored = cpu_with(&[]);
    restored.load_state(&saved).unwrap();
    assert_eq!(restored.regs, cpu.regs);
    assert_eq!(restored.total_cycles(), cpu.total_cycles());

    for _ in 0..3 {
        assert_eq!(restored.step(), cpu.step());
    }
    assert_eq!(restored.regs, cpu.regs);
    assert_eq!(restored.bus.data[0x40000..0x40004], [1u8, 2, 3, 4]);
}

#[test]
fn test_restore_rejects_other_model() {
    let cpu = cpu_model(&[], CpuModel::Intel8088);
    let saved = cpu.save_state();
    let mut other = cpu_with(&[]);
    assert!(matches!(
        other.load_state(&saved),
        Err(StateError::CpuMismatch { .. })
    ));

    let mut bad = saved.clone();
    bad["cpu"] = serde_json::json!("6502");
    assert!(matches!(
        other.load_state(&bad),
        Err(StateError::CpuMismatch { .. })
    ));
}

#[test]
fn test_from_config() {
    let cfg = DeviceConfig::new("maincpu", IsaConfig::mos6502(), 1_000_000);
    assert!(matches!(
        Cpu8086::from_config(&cfg, FlatMemory::new(20)),
        Err(ConfigError::WrongIsa { .. })
    ));

    let mut cfg = DeviceConfig::new(
        "maincpu",
        IsaConfig::Intel8086 {
            model: CpuModel::Intel8088,
            default_intr_vector: 0x40,
        },
        4_772_727,
    );
    cfg.irq_lines = 2;
    cfg.reset_vector = Some(0x12345);
    let cpu = Cpu8086::from_config(&cfg, FlatMemory::new(20)).unwrap();
    assert_eq!(cpu.model(), CpuModel::Intel8088);
    assert_eq!(cpu.name(), "maincpu");
    assert_eq!(cpu.irq_line_count(), 2);
    assert_eq!(cpu.engine.interrupts.line_vector(InputLine::Irq(1)), 0x41);
    assert_eq!((cpu.regs.sregs[CS], cpu.regs.ip), (0x1234, 5));
}

#[test]
fn test_reset_state() {
    let mut cpu = cpu_with(&[0xF4]);
    cpu.step();
    cpu.reset();
    assert_eq!(cpu.run_state(), RunState::Running);
    assert_eq!((cpu.regs.sregs[CS], cpu.regs.ip), (0xFFFF, 0));
    assert_eq!(cpu.regs.sregs[DS], 0);
    assert_eq!(cpu.regs.sregs[SS], 0);
    assert_eq!(cpu.regs.flags(), 0xF002);
    assert_eq!(cpu.pc(), 0xFFFF0);
    assert_eq!(cpu.registers().register("dx"), Some(cpu.regs.w[DX] as u32));
}
