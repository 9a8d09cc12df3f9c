//! Opcode dispatch tables.
//!
//! The primary table has one entry per byte. Three entries select a
//! secondary table for the following byte; the call and return bytes are
//! handled by the execution engine itself. Tables are built once and never
//! change afterwards.

use std::sync::OnceLock;

use opo_common::opcode::{
    CALL_PROCEDURE, INDIRECT_CALL, RETURN, RETURN_ZERO_FLOAT, RETURN_ZERO_LONG,
    RETURN_ZERO_STRING, RETURN_ZERO_WORD,
};
use opo_common::{Prefix, ValueType};

use crate::error::RuntimeError;
use crate::execute::Context;
use crate::ops::{
    arith, control, database, datetime, files, io, logic, maths, memory, strings, vars,
};

/// An opcode handler.
pub(crate) type Handler = fn(&mut Context<'_>) -> Result<(), RuntimeError>;

#[derive(Clone, Copy)]
pub(crate) enum Entry {
    Unassigned,
    Op(Handler),
    Prefix(Prefix),
    Call,
    IndirectCall,
    /// Return; pushes the default of the given type first, if any.
    Return(Option<ValueType>),
}

pub(crate) struct DispatchTables {
    pub(crate) primary: [Entry; 256],
    /// Indexed by [`Prefix::table_index`].
    pub(crate) secondary: [[Option<Handler>; 256]; 3],
}

pub(crate) fn tables() -> &'static DispatchTables {
    static TABLES: OnceLock<DispatchTables> = OnceLock::new();
    TABLES.get_or_init(build)
}

fn family(table: &mut [Entry; 256], base: u8, count: u8, handler: Handler) {
    for op in base..base + count {
        table[op as usize] = Entry::Op(handler);
    }
}

fn build() -> DispatchTables {
    let mut p = [Entry::Unassigned; 256];

    family(&mut p, 0x00, 4, vars::push_local);
    family(&mut p, 0x04, 4, vars::push_local_address);
    family(&mut p, 0x08, 4, vars::push_ee);
    family(&mut p, 0x0C, 4, vars::push_ee_address);
    family(&mut p, 0x10, 4, vars::push_local_element);
    family(&mut p, 0x14, 4, vars::push_local_element_address);
    family(&mut p, 0x18, 4, vars::push_ee_element);
    family(&mut p, 0x1C, 4, vars::push_ee_element_address);
    family(&mut p, 0x20, 4, vars::push_field);
    family(&mut p, 0x28, 4, vars::push_literal);

    family(&mut p, 0x30, 4, logic::less);
    family(&mut p, 0x34, 4, logic::less_equal);
    family(&mut p, 0x38, 4, logic::greater);
    family(&mut p, 0x3C, 4, logic::greater_equal);
    family(&mut p, 0x40, 4, logic::equal);
    family(&mut p, 0x44, 4, logic::not_equal);

    family(&mut p, 0x48, 4, arith::add);
    family(&mut p, 0x4C, 3, arith::subtract);
    p[0x4F] = Entry::Op(vars::push_byte_as_word);
    family(&mut p, 0x50, 3, arith::multiply);
    p[CALL_PROCEDURE as usize] = Entry::Call;
    family(&mut p, 0x54, 3, arith::divide);
    p[Prefix::Function as usize] = Entry::Prefix(Prefix::Function);
    family(&mut p, 0x58, 3, arith::power);
    p[0x5B] = Entry::Op(control::branch_if_false);
    family(&mut p, 0x5C, 3, logic::and);
    p[0x5F] = Entry::Op(vars::push_byte_as_long);
    family(&mut p, 0x60, 3, logic::or);
    p[0x63] = Entry::Op(vars::push_word_as_long);
    family(&mut p, 0x64, 3, logic::not);
    family(&mut p, 0x68, 3, arith::negate);
    p[INDIRECT_CALL as usize] = Entry::IndirectCall;
    p[0x6C] = Entry::Op(arith::less_percent);
    p[0x6D] = Entry::Op(arith::greater_percent);
    p[0x6E] = Entry::Op(arith::plus_percent);
    p[0x6F] = Entry::Op(arith::minus_percent);
    p[0x70] = Entry::Op(arith::multiply_percent);
    p[0x71] = Entry::Op(arith::divide_percent);

    p[RETURN_ZERO_WORD as usize] = Entry::Return(Some(ValueType::Word));
    p[RETURN_ZERO_LONG as usize] = Entry::Return(Some(ValueType::Long));
    p[RETURN_ZERO_FLOAT as usize] = Entry::Return(Some(ValueType::Float));
    p[RETURN_ZERO_STRING as usize] = Entry::Return(Some(ValueType::Str));
    family(&mut p, 0x78, 2, vars::convert_to_word);
    family(&mut p, 0x7A, 2, vars::convert_to_long);
    family(&mut p, 0x7C, 2, vars::convert_to_float);

    family(&mut p, 0x80, 4, vars::discard);
    family(&mut p, 0x84, 4, vars::store);
    family(&mut p, 0x88, 4, io::print);
    p[0x92] = Entry::Op(io::print_newline);
    family(&mut p, 0x98, 4, memory::poke);
    p[0x9C] = Entry::Op(memory::poke_byte);
    p[0x9D] = Entry::Op(database::append);
    p[0x9E] = Entry::Op(io::at);
    p[0xA0] = Entry::Op(io::beep);
    p[0xA1] = Entry::Op(database::close);
    p[0xA2] = Entry::Op(io::cls);
    p[0xA5] = Entry::Op(database::create);
    p[0xA7] = Entry::Op(files::delete);
    p[0xAB] = Entry::Op(control::vector);
    p[0xAE] = Entry::Op(control::load_module);
    p[0xB1] = Entry::Op(control::on_error);
    p[0xB4] = Entry::Op(database::open);
    p[0xB5] = Entry::Op(io::pause);
    p[0xB7] = Entry::Op(io::io_signal);
    p[0xB9] = Entry::Op(maths::randomize);
    p[0xBB] = Entry::Op(control::stop);
    p[0xBC] = Entry::Op(control::trap);
    p[0xBD] = Entry::Op(database::update);
    p[0xBE] = Entry::Op(database::use_file);
    p[0xBF] = Entry::Op(control::goto);
    p[RETURN as usize] = Entry::Return(None);
    p[0xD1] = Entry::Op(io::graphics_cls);
    p[0xD2] = Entry::Op(io::graphics_at);
    p[0xD3] = Entry::Op(io::graphics_move);
    family(&mut p, 0xD4, 4, io::graphics_print);
    p[0xE4] = Entry::Op(io::get_event);
    p[0xE8] = Entry::Op(io::io_wait_status);
    p[0xEA] = Entry::Op(io::menu_init);
    p[0xEB] = Entry::Op(io::menu_card);
    p[0xEC] = Entry::Op(io::dialog_init);
    p[Prefix::Extended as usize] = Entry::Prefix(Prefix::Extended);
    p[0xF8] = Entry::Op(files::make_dir);
    p[0xFA] = Entry::Op(files::set_path);
    p[0xFB] = Entry::Op(datetime::secs_to_date);
    p[0xFC] = Entry::Op(io::info_print);
    p[Prefix::Other as usize] = Entry::Prefix(Prefix::Other);

    let mut f: [Option<Handler>; 256] = [None; 256];
    f[0x00] = Some(memory::address_of);
    f[0x01] = Some(strings::asc);
    f[0x04] = Some(datetime::day);
    f[0x07] = Some(control::err);
    f[0x08] = Some(files::exist);
    f[0x0A] = Some(io::get);
    f[0x0B] = Some(io::io_async);
    f[0x0D] = Some(io::io_open);
    f[0x0E] = Some(io::io_write);
    f[0x0F] = Some(io::io_read);
    f[0x10] = Some(io::io_close);
    f[0x12] = Some(datetime::hour);
    f[0x13] = Some(io::key);
    f[0x14] = Some(strings::len);
    f[0x15] = Some(strings::loc);
    f[0x16] = Some(datetime::minute);
    f[0x17] = Some(datetime::month);
    f[0x18] = Some(memory::peek_byte);
    f[0x19] = Some(memory::peek_word);
    f[0x1C] = Some(datetime::second);
    f[0x1E] = Some(datetime::year);
    f[0x1F] = Some(memory::address_of_string);
    f[0x21] = Some(io::io_seek);
    f[0x2C] = Some(io::graphics_x);
    f[0x2D] = Some(io::graphics_y);
    f[0x34] = Some(io::test_event);
    f[0x36] = Some(io::menu);
    f[0x37] = Some(io::dialog);
    f[0x38] = Some(io::alert);
    f[0x3A] = Some(io::menu_with_highlight);
    f[0x40] = Some(datetime::days);
    f[0x42] = Some(maths::int);
    f[0x45] = Some(datetime::date_to_secs);
    f[0x4B] = Some(memory::alloc);
    f[0x50] = Some(arith::unsigned_add);
    f[0x51] = Some(arith::unsigned_subtract);
    f[0x80] = Some(maths::abs);
    f[0x81] = Some(maths::acos);
    f[0x82] = Some(maths::asin);
    f[0x83] = Some(maths::atan);
    f[0x84] = Some(maths::cos);
    f[0x85] = Some(maths::deg);
    f[0x86] = Some(maths::exp);
    f[0x87] = Some(maths::flt);
    f[0x88] = Some(maths::intf);
    f[0x89] = Some(maths::ln);
    f[0x8A] = Some(maths::log);
    f[0x8B] = Some(memory::peek_float);
    f[0x8C] = Some(maths::pi);
    f[0x8D] = Some(maths::rad);
    f[0x8E] = Some(maths::rnd);
    f[0x8F] = Some(maths::sin);
    f[0x90] = Some(maths::sqr);
    f[0x91] = Some(maths::tan);
    f[0x92] = Some(maths::val);
    f[0x93] = Some(maths::max);
    f[0x94] = Some(maths::mean);
    f[0x95] = Some(maths::min);
    f[0x96] = Some(maths::std);
    f[0x97] = Some(maths::sum);
    f[0x98] = Some(maths::var);
    f[0xC0] = Some(strings::chr);
    f[0xC1] = Some(datetime::datim);
    f[0xC2] = Some(datetime::day_name);
    f[0xC3] = Some(files::dir);
    f[0xC4] = Some(control::err_string);
    f[0xC5] = Some(strings::fix);
    f[0xC6] = Some(strings::gen);
    f[0xC7] = Some(io::get_string);
    f[0xC8] = Some(strings::hex);
    f[0xCA] = Some(strings::left);
    f[0xCB] = Some(strings::lower);
    f[0xCC] = Some(strings::mid);
    f[0xCD] = Some(datetime::month_name);
    f[0xCE] = Some(strings::num);
    f[0xCF] = Some(memory::peek_string);
    f[0xD0] = Some(strings::rept);
    f[0xD1] = Some(strings::right);
    f[0xD3] = Some(strings::upper);

    let mut e: [Option<Handler>; 256] = [None; 256];
    e[0x00] = Some(io::dialog_text);
    e[0x01] = Some(io::dialog_choice);
    e[0x02] = Some(io::dialog_long);
    e[0x03] = Some(io::dialog_float);
    e[0x06] = Some(io::dialog_edit);
    e[0x07] = Some(io::dialog_edit_limited);
    e[0x09] = Some(io::dialog_file);
    e[0x0A] = Some(io::dialog_buttons);
    e[0x0B] = Some(io::dialog_position);

    let mut o: [Option<Handler>; 256] = [None; 256];
    o[0x04] = Some(io::font);
    o[0x05] = Some(io::style);
    o[0x0E] = Some(io::cache);

    let mut secondary = [[None; 256]; 3];
    secondary[Prefix::Function.table_index()] = f;
    secondary[Prefix::Extended.table_index()] = e;
    secondary[Prefix::Other.table_index()] = o;

    DispatchTables {
        primary: p,
        secondary,
    }
}
