// src/kernel/driver/keyboard.rs
//! PS/2 keyboard front end
//!
//! Raw scancodes from the IRQ1 handler are decoded with `pc_keyboard`.
//! Alt+F1..F3 switches terminals and is swallowed here; everything
//! else that decodes to ASCII feeds the console line buffer.

use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, KeyState, Keyboard, ScancodeSet1};
use spin::Mutex;

use crate::kernel::driver::console;
use crate::kernel::terminal::{self, TerminalId};

lazy_static! {
    static ref KEYBOARD: Mutex<Keyboard<layouts::Us104Key, ScancodeSet1>> = Mutex::new(
        Keyboard::new(ScancodeSet1::new(), layouts::Us104Key, HandleControl::Ignore)
    );
}

static ALT_HELD: Mutex<bool> = Mutex::new(false);

/// Feed one scancode from the keyboard interrupt handler.
pub fn handle_scancode(scancode: u8) {
    let event = {
        let mut keyboard = KEYBOARD.lock();
        match keyboard.add_byte(scancode) {
            Ok(Some(event)) => event,
            _ => return,
        }
    };

    match event.code {
        KeyCode::LAlt | KeyCode::RAltGr => {
            *ALT_HELD.lock() = event.state != KeyState::Up;
            return;
        }
        KeyCode::F1 | KeyCode::F2 | KeyCode::F3 if *ALT_HELD.lock() => {
            if event.state == KeyState::Down {
                let target = match event.code {
                    KeyCode::F1 => TerminalId::new(0),
                    KeyCode::F2 => TerminalId::new(1),
                    _ => TerminalId::new(2),
                };
                terminal::switch_to(target);
            }
            return;
        }
        _ => {}
    }

    let decoded = KEYBOARD.lock().process_keyevent(event);
    if let Some(DecodedKey::Unicode(ch)) = decoded {
        if ch.is_ascii() {
            console::input_char(ch);
        }
    }
}
