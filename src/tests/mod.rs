pub mod common;


#[cfg(test)]
mod test_battle_resolution;

#[cfg(test)]
mod test_monthly_claims;
