use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex},
};

use super::*;
use crate::{key::Scalar, ActionHooks, IndexIter, MdbKey, Object, Projection, Transaction};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Member {
    pub primary_id: u32,
    pub name: String,
    pub id1: i32,
    pub id2: i32,
    pub address: String,
    pub money: f64,
}

impl Member {
    pub fn new(name: &str, id1: i32, id2: i32, address: &str, money: f64) -> Member {
        Member {
            primary_id: 0,
            name: name.to_string(),
            id1,
            id2,
            address: address.to_string(),
            money,
        }
    }
}

impl Object for Member {
    fn get_id(&self) -> u32 {
        self.primary_id
    }

    fn set_id(&mut self, id: u32) {
        self.primary_id = id;
    }

    fn field_names() -> &'static [&'static str] {
        &["PrimaryID", "Name", "ID1", "ID2", "Address", "Money"]
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct MemberPb {
    pub name: Option<String>,
    pub id1: Option<i32>,
    pub id2: Option<i32>,
    pub address: String,
    pub money: Option<f64>,
}

impl Projection for MemberPb {
    type Rec = Member;

    fn has_field(name: &str) -> bool {
        matches!(name, "Name" | "ID1" | "ID2" | "Address" | "Money")
    }

    fn field(&self, name: &str) -> Option<Scalar> {
        match name {
            "Name" => self.name.clone().map(Scalar::Str),
            "ID1" => self.id1.map(Scalar::I32),
            "ID2" => self.id2.map(Scalar::I32),
            "Address" => Some(Scalar::Str(self.address.clone())),
            "Money" => self.money.map(Scalar::F64),
            _ => None,
        }
    }

    fn from_record(rec: &Member) -> MemberPb {
        MemberPb {
            name: Some(rec.name.clone()),
            id1: Some(rec.id1),
            id2: Some(rec.id2),
            address: rec.address.clone(),
            money: Some(rec.money),
        }
    }

    fn to_record(&self) -> Member {
        Member {
            primary_id: 0,
            name: self.name.clone().unwrap_or_default(),
            id1: self.id1.unwrap_or_default(),
            id2: self.id2.unwrap_or_default(),
            address: self.address.clone(),
            money: self.money.unwrap_or_default(),
        }
    }
}

pub(crate) fn member_table(other_idx: bool) -> Table<Member> {
    let table: Table<Member> = Table::new("member");
    table.add_index(
        "Name",
        Box::new(|key: &mut MdbKey, obj: &Member| key.append_str(&obj.name)),
        true,
    );
    if other_idx {
        table.add_index(
            "ID1|ID2",
            Box::new(|key: &mut MdbKey, obj: &Member| {
                key.append_i32(obj.id1)?;
                key.append_i32(obj.id2)
            }),
            true,
        );
        table.add_index(
            "Address",
            Box::new(|key: &mut MdbKey, obj: &Member| key.append_str(&obj.address)),
            false,
        );
    }
    table
}

pub(crate) fn seed_objs() -> Vec<Member> {
    vec![
        Member::new("zs1", 1, 10011, "addr-zs", 1.01),
        Member::new("zs2", 1, 10012, "addr-zs", 1.02),
        Member::new("zs3", 1, 10013, "addr-zs", 1.03),
        Member::new("zt1", 2, 10021, "addr-zt", 2.01),
        Member::new("zt2", 2, 10022, "addr-zt", 2.02),
        Member::new("zt3", 2, 10023, "addr-zt", 2.03),
        Member::new("zu1", 3, 10031, "addr-zt4", 3.01),
        Member::new("zu2", 3, 10032, "addr-zt4", 3.02),
        Member::new("zu3", 3, 10033, "addr-zt4", 3.03),
    ]
}

pub(crate) fn fill(table: &Table<Member>) {
    for obj in seed_objs() {
        assert!(table.add(obj, None, 0));
    }
}

pub(crate) fn find_by_name(table: &Table<Member>, name: &str) -> Option<Arc<Member>> {
    table
        .find_by_index_name("Name")
        .append_str(name)
        .fire()
        .step()
}

pub(crate) fn find_by_id(table: &Table<Member>, id1: i32, id2: i32) -> Option<Arc<Member>> {
    table
        .find_by_index_name("ID1|ID2")
        .append_i32(id1)
        .append_i32(id2)
        .fire()
        .step()
}

pub(crate) fn find_by_id1(table: &Table<Member>, id1: i32) -> IndexIter<Member> {
    table.find_by_index_name("ID1|ID2").append_i32(id1).fire()
}

pub(crate) fn find_by_address(table: &Table<Member>, addr: &str) -> IndexIter<Member> {
    table.find_by_index_name("Address").append_str(addr).fire()
}

pub(crate) fn check_objects(table: &Table<Member>) {
    for obj in seed_objs() {
        let got = find_by_name(table, &obj.name).expect("seed record missing");
        assert_eq!(got.name, obj.name);
        assert_eq!(got.id1, obj.id1);
        assert_eq!(got.id2, obj.id2);
        assert_eq!(got.address, obj.address);
    }
}

fn sort_objs() -> Vec<Member> {
    let mut objs = Vec::new();
    let groups = [(1_i32, 10000_i32, "zs"), (2, 20000, "zt"), (3, 30000, "zu")];
    for (id1, id2, name) in groups.iter() {
        for i in 0..50_i32 {
            let money = (i as f64) * 0.01 + (*id1 as f64);
            let money = if *id1 == 1 { -money } else { money };
            let nn = format!("{}{}", name, i + id1);
            objs.push(Member::new(&nn, *id1, id2 + i, &format!("addr-{}", name), money));
        }
    }
    objs
}

fn shuffled(n: usize, rng: &mut SmallRng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..i + 1);
        order.swap(i, j);
    }
    order
}

#[test]
fn test_find_by_name() {
    let mdb = member_table(true);
    fill(&mdb);
    check_objects(&mdb);

    let mut iter = mdb.find_by_index_name("Name").append_str("zs2").fire();
    assert_eq!(iter.step().map(|o| o.name.clone()), Some("zs2".to_string()));
    assert_eq!(iter.step(), None);

    let mut iter = mdb.find_by_index_name("Name").append_str("zt1").fire();
    assert_eq!(iter.step().map(|o| o.name.clone()), Some("zt1".to_string()));
    assert_eq!(iter.step(), None);

    assert_eq!(find_by_name(&mdb, "nope"), None);
}

#[test]
fn test_composite_lookup() {
    let mdb = member_table(true);
    fill(&mdb);

    let got = find_by_id(&mdb, 1, 10012).expect("zs2");
    assert_eq!(got.name, "zs2");
    assert_eq!(find_by_id(&mdb, 2, 10021).map(|o| o.name.clone()), Some("zt1".into()));
    assert_eq!(find_by_id(&mdb, 9, 9), None);

    let mut iter = find_by_id1(&mdb, 1);
    assert_eq!(iter.step().map(|o| o.name.clone()), Some("zs1".into()));
    assert_eq!(iter.step().map(|o| o.name.clone()), Some("zs2".into()));
    assert_eq!(iter.step().map(|o| o.name.clone()), Some("zs3".into()));
    assert_eq!(iter.step(), None);

    let mut iter = find_by_id1(&mdb, 2);
    assert_eq!(iter.step().map(|o| o.name.clone()), Some("zt1".into()));
    assert_eq!(iter.step().map(|o| o.name.clone()), Some("zt2".into()));
    assert_eq!(iter.step().map(|o| o.name.clone()), Some("zt3".into()));
    assert_eq!(iter.step(), None);

    // raw stepping keeps going past the seeked composite prefix, in
    // index order across the whole tree
    let mut iter = find_by_id1(&mdb, 1);
    for obj in seed_objs().iter() {
        let got = iter.raw_step().expect("raw walk");
        assert_eq!(got.name, obj.name);
    }
    assert!(iter.raw_step().is_none());
}

#[test]
fn test_iterators() {
    let mdb = member_table(true);
    fill(&mdb);

    // primary index yields records in id order
    let mut id = 1_u32;
    let mut iter = mdb.begin(0);
    while let Some(obj) = iter.step() {
        assert_eq!(obj.get_id(), id);
        id += 1;
    }
    assert_eq!((id - 1) as usize, seed_objs().len());

    for idx_num in 1..4 {
        let mut count = 0;
        let mut iter = mdb.begin(idx_num);
        while iter.step().is_some() {
            count += 1;
        }
        assert_eq!(count, seed_objs().len());
    }
}

#[test]
fn test_raw_iterator() {
    let mdb = member_table(true);
    fill(&mdb);

    // names sort like ids here, so a raw walk from zs2 sees 2..=9
    let mut id = 2_u32;
    let mut iter = mdb.find_by_index_name("Name").append_str("zs2").fire();
    while iter.raw_next() {
        assert_eq!(iter.value().unwrap().get_id(), id);
        id += 1;
    }
    assert_eq!((id - 1) as usize, seed_objs().len());

    let mut id = 2_u32;
    let mut iter = mdb
        .find_by_index_name("ID1|ID2")
        .append_i32(1)
        .append_i32(10012)
        .fire();
    while iter.raw_next() {
        assert_eq!(iter.value().unwrap().get_id(), id);
        id += 1;
    }
    assert_eq!((id - 1) as usize, seed_objs().len());
}

#[test]
fn test_raw_iterator_from_last() {
    let mdb = member_table(false);
    let objs = seed_objs();
    assert!(mdb.add(objs[0].clone(), None, 0));
    assert!(mdb.add(objs[1].clone(), None, 0));

    let mut iter = mdb.find_by_index_name("Name").append_str("zs2").fire();
    assert!(iter.raw_next());
    assert_eq!(iter.value().unwrap().get_id(), 2);
    assert!(!iter.raw_next());
    assert!(!iter.raw_next());
}

#[test]
fn test_non_unique_lookup() {
    let mdb = member_table(true);
    fill(&mdb);

    for (addr, names) in [
        ("addr-zs", ["zs1", "zs2", "zs3"]),
        ("addr-zt", ["zt1", "zt2", "zt3"]),
        ("addr-zt4", ["zu1", "zu2", "zu3"]),
    ]
    .iter()
    {
        let mut iter = find_by_address(&mdb, addr);
        for name in names.iter() {
            assert_eq!(iter.step().map(|o| o.name.clone()), Some(name.to_string()));
        }
        assert_eq!(iter.step(), None);
    }

    // a non-unique key of exactly 255 bytes is accepted
    let addr = "1".repeat(255);
    let obj = Member::new("big", 4, 10041, &addr, 4.0);
    assert!(mdb.add(obj, None, 0));
    assert_eq!(
        find_by_address(&mdb, &addr).step().map(|o| o.name.clone()),
        Some("big".into())
    );

    // 256 bytes is fatal at the table boundary
    let addr = "1".repeat(256);
    let obj = Member::new("bigger", 5, 10051, &addr, 5.0);
    let res = catch_unwind(AssertUnwindSafe(|| mdb.add(obj, None, 0)));
    assert!(res.is_err());
    check_objects(&mdb);
}

#[test]
fn test_composite_non_unique() {
    let mdb = member_table(false);
    mdb.add_index(
        "ID1|ID2",
        Box::new(|key: &mut MdbKey, obj: &Member| {
            key.append_i32(obj.id1)?;
            key.append_i32(obj.id2)
        }),
        false,
    );
    fill(&mdb);

    let got = find_by_id(&mdb, 1, 10012).expect("zs2");
    assert_eq!(got.name, "zs2");

    // logical duplicates under a composite non-unique key
    assert!(mdb.add(Member::new("zs2-dup1", 1, 10012, "addr-zs", 0.0), None, 0));
    assert!(mdb.add(Member::new("zs2-dup2", 1, 10012, "addr-zs", 0.0), None, 0));
    assert!(mdb.add(Member::new("zs2-dup3", 1, 10012, "addr-zs", 0.0), None, 0));

    // exact composite lookup walks the duplicates in insertion order
    let mut iter = mdb
        .find_by_index_name("ID1|ID2")
        .append_i32(1)
        .append_i32(10012)
        .fire();
    for name in ["zs2", "zs2-dup1", "zs2-dup2", "zs2-dup3"].iter() {
        assert_eq!(iter.step().map(|o| o.name.clone()), Some(name.to_string()));
    }
    assert_eq!(iter.step(), None);

    // partial composite lookup interleaves them at the right spot
    let mut iter = find_by_id1(&mdb, 1);
    for name in ["zs1", "zs2", "zs2-dup1", "zs2-dup2", "zs2-dup3", "zs3"].iter() {
        assert_eq!(iter.step().map(|o| o.name.clone()), Some(name.to_string()));
    }
    assert_eq!(iter.step(), None);
}

#[test]
fn test_index_collisions_are_fatal() {
    let mdb = member_table(true);
    fill(&mdb);

    // name collision
    let dup = Member::new("zs1", 1, 10011, "addr-x", 0.0);
    assert!(catch_unwind(AssertUnwindSafe(|| mdb.add(dup, None, 0))).is_err());
    check_objects(&mdb);

    // composite id collision
    let dup = Member::new("zs1_", 1, 10011, "addr-x", 0.0);
    assert!(catch_unwind(AssertUnwindSafe(|| mdb.add(dup, None, 0))).is_err());
    check_objects(&mdb);

    // updating a record that was never queried is a programmer error
    let loose = Arc::new(Member::new("zs1", 1, 10011, "addr-x", 0.0));
    let loose2 = (*loose).clone();
    assert!(
        catch_unwind(AssertUnwindSafe(|| mdb.update(&loose, loose2, None, 0))).is_err()
    );
    check_objects(&mdb);

    // rekey collisions on update
    let zs1 = find_by_name(&mdb, "zs1").unwrap();
    let mut clash = (*zs1).clone();
    clash.id2 += 1; // collides with zs2's (1, 10012)
    assert!(
        catch_unwind(AssertUnwindSafe(|| mdb.update(&zs1, clash, None, 0))).is_err()
    );
    check_objects(&mdb);

    let zs1 = find_by_name(&mdb, "zs1").unwrap();
    let mut clash = (*zs1).clone();
    clash.name = "zs2".to_string();
    assert!(
        catch_unwind(AssertUnwindSafe(|| mdb.update(&zs1, clash, None, 0))).is_err()
    );
    check_objects(&mdb);
}

#[test]
fn test_update_rekeys() {
    let mdb = member_table(true);
    fill(&mdb);

    let zs1 = find_by_name(&mdb, "zs1").unwrap();
    let mut new = (*zs1).clone();
    new.id2 += 10000;
    new.name.push('_');
    assert!(mdb.update(&zs1, new.clone(), None, 0));

    let got = find_by_id(&mdb, new.id1, new.id2).expect("rekeyed");
    assert_eq!(got.name, "zs1_");
    assert_eq!(got.get_id(), zs1.get_id());
    assert_eq!(
        find_by_name(&mdb, "zs1_").map(|o| o.id2),
        Some(zs1.id2 + 10000)
    );

    // the old keys are gone
    assert_eq!(find_by_id(&mdb, zs1.id1, zs1.id2), None);
    assert_eq!(find_by_name(&mdb, "zs1"), None);
    mdb.validate().unwrap();
}

#[test]
fn test_transaction_basic() {
    let mdb = member_table(true);
    fill(&mdb);

    let mut txn = Transaction::new();
    let zs2 = find_by_name(&mdb, "zs2").unwrap();
    let mut tmp = (*zs2).clone();
    tmp.address.push_str("_DDDD");
    assert!(mdb.update(&zs2, tmp.clone(), Some(&mut txn), 0));
    txn.commit(0);
    assert_eq!(
        find_by_name(&mdb, "zs2").map(|o| o.address.clone()),
        Some(tmp.address.clone())
    );

    // remove under the transaction, then roll it back
    assert!(mdb.remove(&zs2, Some(&mut txn), 0));
    assert_eq!(find_by_name(&mdb, "zs2"), None);
    txn.rollback();
    assert_eq!(
        find_by_name(&mdb, "zs2").map(|o| o.address.clone()),
        Some(tmp.address)
    );
}

#[test]
fn test_sort_descending() {
    let seed: u64 = random();
    println!("test_sort_descending seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let mdb = member_table(false);
    let idx_num = mdb.add_index(
        "ID1|Money",
        Box::new(|key: &mut MdbKey, obj: &Member| {
            key.append_i32(obj.id1)?;
            key.append_f64(obj.money)
        }),
        true,
    );
    mdb.get_index(idx_num).unwrap().sort_great();

    let objs = sort_objs();
    let mut ss = Vec::new();
    for i in shuffled(objs.len(), &mut rng) {
        assert!(mdb.add(objs[i].clone(), None, 0));
        ss.push(objs[i].clone());
    }
    ss.sort_by(|a, b| a.money.partial_cmp(&b.money).unwrap());

    let first = ss.last().unwrap();
    let mut iter = mdb.find_by_index(idx_num).append_i32(first.id1).fire();
    for obj in ss.iter().rev() {
        let got = iter.raw_step().expect("descending walk");
        assert_eq!(got.name, obj.name);
    }
    assert!(iter.raw_step().is_none());
}

#[test]
fn test_sort_ascending() {
    let seed: u64 = random();
    println!("test_sort_ascending seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let mdb = member_table(false);
    let idx_num = mdb.add_index(
        "ID1|Money",
        Box::new(|key: &mut MdbKey, obj: &Member| {
            key.append_i32(obj.id1)?;
            key.append_f64(obj.money)
        }),
        true,
    );
    mdb.get_index(idx_num).unwrap().sort_less();

    let objs = sort_objs();
    let mut ss = Vec::new();
    for i in shuffled(objs.len(), &mut rng) {
        assert!(mdb.add(objs[i].clone(), None, 0));
        ss.push(objs[i].clone());
    }
    ss.sort_by(|a, b| a.money.partial_cmp(&b.money).unwrap());

    let first = &ss[0];
    let mut iter = mdb.find_by_index(idx_num).append_i32(first.id1).fire();
    for obj in ss.iter() {
        let got = iter.raw_step().expect("ascending walk");
        assert_eq!(got.name, obj.name);
    }
    assert!(iter.raw_step().is_none());
}

#[test]
fn test_float_index_order() {
    let mdb = member_table(false);
    mdb.add_index(
        "Money",
        Box::new(|key: &mut MdbKey, obj: &Member| key.append_f64(obj.money)),
        false,
    );

    let mut ss = sort_objs();
    for obj in ss.iter() {
        assert!(mdb.add(obj.clone(), None, 0));
    }
    ss.sort_by(|a, b| a.money.partial_cmp(&b.money).unwrap());

    let mut iter = mdb
        .find_by_index_name("Money")
        .append_f64(ss[0].money)
        .fire();
    for obj in ss.iter() {
        let got = iter.raw_step().expect("float walk");
        assert_eq!(got.name, obj.name);
    }
    assert!(iter.raw_step().is_none());
}

#[test]
fn test_float_index_order_descending() {
    let mdb = member_table(false);
    mdb.add_index(
        "Money",
        Box::new(|key: &mut MdbKey, obj: &Member| key.append_f64(obj.money)),
        false,
    );
    mdb.get_index_by_name("Money").unwrap().sort_great();

    let mut ss = sort_objs();
    for obj in ss.iter() {
        assert!(mdb.add(obj.clone(), None, 0));
    }
    ss.sort_by(|a, b| a.money.partial_cmp(&b.money).unwrap());

    let mut iter = mdb
        .find_by_index_name("Money")
        .append_f64(ss.last().unwrap().money)
        .fire();
    for obj in ss.iter().rev() {
        let got = iter.raw_step().expect("float walk");
        assert_eq!(got.name, obj.name);
    }
    assert!(iter.raw_step().is_none());
}

#[test]
fn test_non_unique_insertion_order() {
    // duplicates under one key iterate in insertion order, under both
    // comparators
    let mdb = member_table(true);
    mdb.get_index(3).unwrap().sort_great();
    fill(&mdb);
    let mut iter = find_by_address(&mdb, "addr-zs");
    for name in ["zs1", "zs2", "zs3"].iter() {
        assert_eq!(iter.step().map(|o| o.name.clone()), Some(name.to_string()));
    }
    assert_eq!(iter.step(), None);

    let mdb = member_table(true);
    mdb.get_index(3).unwrap().sort_less();
    fill(&mdb);
    let mut iter = find_by_address(&mdb, "addr-zs");
    for name in ["zs1", "zs2", "zs3"].iter() {
        assert_eq!(iter.step().map(|o| o.name.clone()), Some(name.to_string()));
    }
    assert_eq!(iter.step(), None);
}

#[test]
fn test_delete_in_iteration() {
    let mdb = member_table(false);
    fill(&mdb);

    let mut txn = Transaction::new();
    let mut iter = mdb.begin(1);
    iter.lock_db();
    while iter.next() {
        let obj = iter.value().unwrap();
        assert!(mdb.remove(&obj, Some(&mut txn), 0));
    }
    iter.unlock_db();
    txn.commit(0);

    assert_eq!(mdb.count(), 0);
    assert!(mdb.is_empty());
    assert!(mdb.free_list_len() > 0);
    mdb.validate().unwrap();
}

#[test]
fn test_signed_int_order() {
    let mdb = member_table(true);
    let (min_id, max_id) = (-50_i32, 50_i32);
    for i in min_id..=max_id {
        let obj = Member::new(&format!("{}", i), i, 0, "", 0.0);
        assert!(mdb.add(obj, None, 0));
    }

    let mut iter = find_by_id1(&mdb, min_id);
    for i in min_id..=max_id {
        let got = iter.raw_step().expect("ascending signed walk");
        assert_eq!(got.id1, i);
    }
    assert!(iter.raw_step().is_none());

    // descending
    let mdb = member_table(true);
    mdb.get_index_by_name("ID1|ID2").unwrap().sort_great();
    for i in min_id..=max_id {
        let obj = Member::new(&format!("{}", i), i, 0, "", 0.0);
        assert!(mdb.add(obj, None, 0));
    }
    let mut iter = find_by_id1(&mdb, max_id);
    for i in (min_id..=max_id).rev() {
        let got = iter.raw_step().expect("descending signed walk");
        assert_eq!(got.id1, i);
    }
    assert!(iter.raw_step().is_none());
}

#[test]
fn test_projection() {
    let mdb = member_table(true);
    fill(&mdb);
    let zs1 = find_by_name(&mdb, "zs1").unwrap();

    let pb = MemberPb {
        name: Some(zs1.name.clone()),
        ..Default::default()
    };
    let mut iter = mdb.find_by_pb(&pb).unwrap();
    assert_eq!(iter.step().map(|o| o.name.clone()), Some("zs1".into()));

    let pb = MemberPb {
        id1: Some(zs1.id1),
        id2: Some(zs1.id2),
        ..Default::default()
    };
    let mut iter = mdb.find_by_pb(&pb).unwrap();
    assert_eq!(iter.step().map(|o| o.name.clone()), Some("zs1".into()));

    // address is not optional in the projection, so it alone matches
    // the address index
    let pb = MemberPb {
        address: zs1.address.clone(),
        ..Default::default()
    };
    let mut iter = mdb.find_by_pb(&pb).unwrap();
    for name in ["zs1", "zs2", "zs3"].iter() {
        assert_eq!(iter.step().map(|o| o.name.clone()), Some(name.to_string()));
    }
    assert_eq!(iter.step(), None);

    // a present leading field with an absent tail truncates the prefix
    let pb = MemberPb {
        id1: Some(zs1.id1),
        ..Default::default()
    };
    let mut iter = mdb.find_by_pb(&pb).unwrap();
    for name in ["zs1", "zs2", "zs3"].iter() {
        assert_eq!(iter.step().map(|o| o.name.clone()), Some(name.to_string()));
    }
    assert_eq!(iter.step(), None);

    // conversions
    let pb = MemberPb::from_record(&zs1);
    assert_eq!(pb.name.as_deref(), Some("zs1"));
    assert_eq!(pb.id1, Some(zs1.id1));
    assert_eq!(pb.id2, Some(zs1.id2));
    assert_eq!(pb.address, zs1.address);

    let rec = pb.to_record();
    assert_eq!(rec.name, zs1.name);
    assert_eq!(rec.id1, zs1.id1);
    assert_eq!(rec.id2, zs1.id2);
    assert_eq!(rec.address, zs1.address);
    assert_eq!(rec.money, zs1.money);

    // round trip over a record that never entered the table
    let fresh = Member::new("fresh", 7, 7007, "addr-f", 7.7);
    assert_eq!(MemberPb::from_record(&fresh).to_record(), fresh);
}

#[test]
fn test_before_triggers_abort() {
    let mdb = member_table(true);
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let trigger = Arc::new(ActionHooks::<Member> {
        before_add: Some(Box::new({
            let log = Arc::clone(&log);
            move |_, obj: &Member, _| {
                log.lock().unwrap().push(format!("before:{}", obj.name));
                obj.name != "blocked"
            }
        })),
        after_add: Some(Box::new({
            let log = Arc::clone(&log);
            move |_, obj: &Member, _| {
                log.lock().unwrap().push(format!("after:{}", obj.name));
            }
        })),
        ..Default::default()
    });
    mdb.add_action_trigger(trigger);

    assert!(mdb.add(Member::new("ok", 1, 1, "a", 0.0), None, 0));
    assert!(!mdb.add(Member::new("blocked", 2, 2, "a", 0.0), None, 0));
    assert_eq!(mdb.count(), 1);
    assert_eq!(find_by_name(&mdb, "blocked"), None);
    assert_eq!(
        log.lock().unwrap().clone(),
        vec!["before:ok", "after:ok", "before:blocked"]
    );
}

#[test]
fn test_walk() {
    let mdb = member_table(true);
    fill(&mdb);

    let got = mdb.walk(|obj| obj.name == "zt2").expect("walk hit");
    assert_eq!(got.name, "zt2");
    assert!(mdb.walk(|obj| obj.id1 == 99).is_none());
}

#[test]
fn test_remove_all_and_clear() {
    let mdb = member_table(true);
    fill(&mdb);
    assert_eq!(mdb.count(), 9);

    mdb.remove_all(None, 0);
    assert_eq!(mdb.count(), 0);
    assert_eq!(find_by_name(&mdb, "zs1"), None);

    // ids are never reused within the table's lifetime
    assert!(mdb.add(Member::new("later", 4, 4, "a", 0.0), None, 0));
    assert_eq!(find_by_name(&mdb, "later").unwrap().get_id(), 10);

    mdb.clear();
    assert_eq!(mdb.count(), 0);
    mdb.reset_max_id();
    assert!(mdb.add(Member::new("first", 5, 5, "a", 0.0), None, 0));
    assert_eq!(find_by_name(&mdb, "first").unwrap().get_id(), 1);
}

#[test]
fn test_record_limit_is_fatal() {
    let mdb = member_table(false);
    mdb.set_max_id(i32::MAX as u32 + 1);
    let res = catch_unwind(AssertUnwindSafe(|| {
        mdb.add(Member::new("over", 1, 1, "a", 0.0), None, 0)
    }));
    assert!(res.is_err());
}

#[test]
fn test_find_by_primary_id() {
    let mdb = member_table(true);
    fill(&mdb);

    let got = mdb.find_by_primary_id(3).step().expect("id 3");
    assert_eq!(got.name, "zs3");
    assert!(mdb.find_by_primary_id(99).step().is_none());
}

#[test]
fn test_add_index_idempotent() {
    let mdb = member_table(true);
    let n = mdb.add_index(
        "Address",
        Box::new(|key: &mut MdbKey, obj: &Member| key.append_str(&obj.address)),
        false,
    );
    assert_eq!(n, 3);
    assert!(mdb.get_index(3).is_some());
    assert!(mdb.get_index(4).is_none());
    assert!(mdb.get_index_by_name("Nope").is_none());
}
