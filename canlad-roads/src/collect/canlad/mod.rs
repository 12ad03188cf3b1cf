pub mod canlad_collect;
