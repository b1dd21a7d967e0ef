use ambar::Queue;
use std::sync::Arc;
use std::thread;

#[test]
fn test_queue_simple() {
    let q = Queue::new();
    q.push(1);
    q.push(2);
    assert_eq!(q.try_pop(), Some(1));
    assert_eq!(q.try_pop(), Some(2));
    assert_eq!(q.try_pop(), None);
}

#[test]
fn test_round_trip() {
    let q = Queue::new();
    let v = String::from("round trip");
    q.push(v.clone());
    assert_eq!(q.try_pop(), Some(v));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_queue_concurrent() {
    let q = Arc::new(Queue::new());
    let mut handles = vec![];

    // Producers
    for i in 0..4 {
        let q = q.clone();
        handles.push(thread::spawn(move || {
            for j in 0..1000 {
                q.push(i * 1000 + j);
            }
        }));
    }

    // Consumers
    for _ in 0..4 {
        let q = q.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                while q.try_pop().is_none() {
                    thread::yield_now();
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert!(q.try_pop().is_none());
    assert!(q.is_empty());
}
