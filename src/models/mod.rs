pub mod aap;
