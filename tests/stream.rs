use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use sockhttp::network::error::Error;
use sockhttp::network::http::{Client, Config, Method, Request, Response, ResponseBody};

/// Send `GET /` against a one-shot stub that answers with `response_bytes`
/// and keeps the connection open until the client side is done.
fn response_from_stub(response_bytes: &'static [u8]) -> (Response, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        socket.write_all(response_bytes).unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut drained = Vec::new();
        let _ = socket.read_to_end(&mut drained);
    });

    let config = Config::builder()
        .remote(format!("tcp://127.0.0.1:{port}"))
        .timeout_ms(5_000)
        .build()
        .unwrap();
    let response = Client::new(config)
        .send(Request::new(Method::Get, "/").unwrap())
        .unwrap();
    (response, server)
}

#[test]
fn reads_never_pass_the_declared_size() {
    // Declared size 4, but the server pushes trailing junk on the same
    // connection.
    let (mut response, server) =
        response_from_stub(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nTestJUNK");

    let mut buf = [0u8; 64];
    let mut total = 0;
    loop {
        let n = response.body.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        total += n;
    }
    assert_eq!(total, 4);

    drop(response);
    server.join().unwrap();
}

#[test]
fn contents_picks_up_after_a_partial_read() {
    let (mut response, server) =
        response_from_stub(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nTest");

    let mut first = [0u8; 2];
    assert_eq!(response.body.read(&mut first).unwrap(), 2);
    assert_eq!(&first, b"Te");
    assert_eq!(response.body.contents().unwrap(), b"st");
    assert_eq!(response.body.contents().unwrap(), b"");

    drop(response);
    server.join().unwrap();
}

#[test]
fn stream_introspection_tracks_consumption() {
    let (mut response, server) =
        response_from_stub(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nTest");

    let ResponseBody::Stream(stream) = &mut response.body else {
        panic!("undecoded response should carry a raw socket stream");
    };
    assert_eq!(stream.size(), Some(4));
    assert_eq!(stream.tell().unwrap(), 0);
    assert!(!stream.eof().unwrap());

    let metadata = stream.metadata().unwrap();
    assert!(metadata.peer.unwrap().starts_with("127.0.0.1:"));
    assert!(!metadata.tls);
    assert_eq!(metadata.read_timeout, Some(Duration::from_secs(5)));

    assert_eq!(stream.contents().unwrap(), b"Test");
    assert_eq!(stream.tell().unwrap(), 4);
    assert!(stream.eof().unwrap());

    drop(response);
    server.join().unwrap();
}

#[test]
fn detach_hands_the_socket_over_exactly_once() {
    let (mut response, server) =
        response_from_stub(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nTest");

    let socket = response.body.detach().expect("first detach yields the socket");
    assert!(response.body.detach().is_none());
    assert!(matches!(response.body.contents(), Err(Error::Stream(_))));
    assert!(matches!(response.body.close(), Err(Error::Stream(_))));

    // The caller now owns the transport and can keep reading it raw.
    let mut socket = socket;
    let mut body = [0u8; 4];
    socket.read_exact(&mut body).unwrap();
    assert_eq!(&body, b"Test");
    socket.close();

    drop(response);
    server.join().unwrap();
}

#[test]
fn closed_stream_refuses_further_use() {
    let (mut response, server) =
        response_from_stub(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nTest");

    response.body.close().unwrap();
    assert!(matches!(response.body.read(&mut [0u8; 4]), Err(Error::Stream(_))));
    assert!(matches!(response.body.close(), Err(Error::Stream(_))));

    drop(response);
    server.join().unwrap();
}

#[test]
fn early_close_by_the_peer_is_a_stream_error() {
    // Declared size 10 but only 4 bytes before the server closes.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nTest")
            .unwrap();
        drop(socket);
    });

    let config = Config::builder()
        .remote(format!("tcp://127.0.0.1:{port}"))
        .timeout_ms(5_000)
        .build()
        .unwrap();
    let mut response = Client::new(config)
        .send(Request::new(Method::Get, "/").unwrap())
        .unwrap();

    let err = response.body.contents().unwrap_err();
    assert!(matches!(err, Error::Stream(_)), "got {err:?}");

    server.join().unwrap();
}

#[test]
fn detached_socket_survives_dropping_the_response() {
    let (mut response, server) =
        response_from_stub(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nTest");

    let socket = response.body.detach().unwrap();
    drop(response);

    // Dropping the response must not have closed the detached socket.
    let mut socket = socket;
    let mut body = [0u8; 4];
    socket.read_exact(&mut body).unwrap();
    assert_eq!(&body, b"Test");
    socket.close();

    server.join().unwrap();
}

#[test]
fn raw_sockets_interoperate_with_std_io() {
    // The detached handle is a plain blocking transport; make sure it
    // composes with std readers the way any socket would.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        socket.write_all(b"ping").unwrap();
    });

    let mut stream = TcpStream::connect(addr).unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"ping");
    server.join().unwrap();
}
