pub(crate) mod generate_rent;
