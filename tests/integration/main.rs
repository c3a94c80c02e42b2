//! End-to-end scenarios driven through `Engine`.


mod claims;
mod keeper;
mod liquidity;
mod properties;
mod rounds;
