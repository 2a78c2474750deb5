//! Shared factories under concurrent use.

use crate::common::*;
use ledgerwire::{SerializationContext, SerializationScheme, UseCase};
use rand::Rng;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;

#[test]
fn shared_factory_round_trips_from_many_threads() {
    let factory = Arc::new(open_factory(vec![person()]));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let factory = Arc::clone(&factory);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                barrier.wait();
                for _ in 0..50 {
                    let friend = record(
                        &factory,
                        "net.example.Person",
                        vec![Value::string(format!("f{}", i)), Value::Int(rng.gen_range(0..120)), Value::Null],
                    );
                    let person = record(
                        &factory,
                        "net.example.Person",
                        vec![Value::string(format!("p{}", i)), Value::Int(rng.gen()), friend],
                    );
                    assert_eq!(round_trip(&factory, &person), person);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Racing builders may each build, but only one serializer is kept.
    let first = factory.get_declared(&TypeRef::named("net.example.Person")).unwrap();
    let again = factory.get_declared(&TypeRef::named("net.example.Person")).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
}

#[test]
fn concurrent_carpentry_agrees_on_one_type() {
    let writer = open_factory(vec![TypeDescriptor::composite("net.remote.Reading")
        .property("sensor", TypeRef::STRING)
        .property("value", TypeRef::DOUBLE)
        .build()]);
    let reading = record(&writer, "net.remote.Reading", vec![Value::string("t1"), Value::Double(21.5)]);
    let bytes = Arc::new(serialize(&writer, &reading).unwrap());

    let reader = Arc::new(open_factory(vec![]));
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let reader = Arc::clone(&reader);
            let barrier = Arc::clone(&barrier);
            let bytes = Arc::clone(&bytes);
            thread::spawn(move || {
                barrier.wait();
                deserialize(&reader, &bytes).unwrap()
            })
        })
        .collect();
    let decoded: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let first = decoded[0].as_record().unwrap();
    for value in &decoded[1..] {
        assert!(first.same_runtime_type(value.as_record().unwrap()));
        assert_eq!(value, &decoded[0]);
    }
    assert_eq!(reader.carpenter().len(), 1);
}

#[test]
fn scheme_hands_out_one_factory_per_context() {
    init_tracing();
    let scheme = Arc::new(SerializationScheme::default());
    let ctx = SerializationContext::new(UseCase::Rpc, class_path(vec![person()]), Arc::new(AllWhitelist));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let scheme = Arc::clone(&scheme);
            let ctx = ctx.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                scheme.factory_for(&ctx).unwrap()
            })
        })
        .collect();
    let factories: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for f in &factories[1..] {
        assert!(Arc::ptr_eq(f, &factories[0]));
    }
    assert_eq!(scheme.factory_count(), 1);
}
