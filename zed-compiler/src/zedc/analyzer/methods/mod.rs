// SPDX-License-Identifier: AGPL-3.0

pub mod decl_lowering;
pub mod expr_lowering;
pub mod op_lowering;
pub mod sql_lowering;
