mod anthropic;

pub(crate) use anthropic::*;
